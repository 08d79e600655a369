//! End-to-end round-trip tests over in-memory bags
//!
//! Bags are assembled from records through the same codec the composer
//! uses, read back into the index model, re-composed, and compared
//! field-by-field.

use rosbag_rs::records::{FILE_HEADER_RECORD_LEN, MAGIC};
use rosbag_rs::{
    create_chunk, BagComposer, BagError, BagHeaderRecord, BagReader, BytesSource,
    ChunkConnectionCount, ChunkInfoRecord, ChunkRecord, ComposeOptions, ConnectionRecord,
    IndexDataRecord, MessageDataRecord, ReadOptions, Time,
};

/// Assemble a canonical bag byte stream from records.
fn assemble_bag(
    connections: &[ConnectionRecord],
    chunks: &[(ChunkRecord, Vec<IndexDataRecord>)],
) -> Vec<u8> {
    let base = MAGIC.len() + FILE_HEADER_RECORD_LEN;

    let mut chunk_section = Vec::new();
    let mut infos = Vec::new();
    for (chunk, index_data) in chunks {
        let chunk_pos = (base + chunk_section.len()) as u64;
        chunk.write(&mut chunk_section).unwrap();

        let mut entries = Vec::new();
        let mut start: Option<Time> = None;
        let mut end: Option<Time> = None;
        for index in index_data {
            entries.push(ChunkConnectionCount {
                conn: index.conn,
                count: index.entries.len() as u32,
            });
            for entry in &index.entries {
                start = Some(start.map_or(entry.time, |t| t.min(entry.time)));
                end = Some(end.map_or(entry.time, |t| t.max(entry.time)));
            }
            index.write(&mut chunk_section).unwrap();
        }

        infos.push(ChunkInfoRecord {
            ver: 1,
            chunk_pos,
            start_time: start.unwrap_or_default(),
            end_time: end.unwrap_or_default(),
            entries,
        });
    }

    let header = BagHeaderRecord {
        index_pos: (base + chunk_section.len()) as u64,
        conn_count: connections.len() as u32,
        chunk_count: infos.len() as u32,
    };

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    header.write(&mut out).unwrap();
    out.extend_from_slice(&chunk_section);

    let mut by_id = connections.to_vec();
    by_id.sort_by_key(|c| c.conn);
    for connection in &by_id {
        connection.write(&mut out).unwrap();
    }
    for info in &infos {
        info.write(&mut out).unwrap();
    }
    out
}

fn connection(conn: u32, topic: &str, datatype: &str) -> ConnectionRecord {
    ConnectionRecord {
        conn,
        topic: topic.to_string(),
        datatype: datatype.to_string(),
        md5sum: "x".to_string(),
        message_definition: format!("{datatype} a 1"),
        callerid: None,
        latching: None,
    }
}

fn message(conn: u32, time: Time, payload: &[u8]) -> MessageDataRecord {
    MessageDataRecord {
        conn,
        time,
        data: payload.to_vec(),
    }
}

#[test]
fn test_empty_bag_layout() {
    let bytes = assemble_bag(&[], &[]);
    assert_eq!(bytes.len(), 4117);

    let mut reader = BagReader::open(BytesSource::new(bytes.clone())).unwrap();
    let index = reader.read_index().unwrap();
    assert_eq!(index.header.index_pos, 4117);
    assert_eq!(index.header.conn_count, 0);
    assert_eq!(index.header.chunk_count, 0);

    let composed = BagComposer::new(&mut reader, &index)
        .compose(&ComposeOptions::default())
        .unwrap();
    assert_eq!(composed.len(), 4117);
    assert_eq!(composed, bytes);
}

#[test]
fn test_single_message_bag_round_trip() {
    let connections = vec![connection(0, "/a", "T")];
    let group = create_chunk(&[message(0, Time::new(1, 0), &[0xDE, 0xAD])]).unwrap();
    let bytes = assemble_bag(&connections, &[group]);

    let mut reader = BagReader::open(BytesSource::new(bytes.clone())).unwrap();
    let index = reader.read_index().unwrap();

    assert_eq!(index.connections.len(), 1);
    assert_eq!(index.connections[&0].topic, "/a");
    assert_eq!(index.chunk_infos.len(), 1);

    let info = &index.chunk_infos[0];
    assert_eq!(info.chunk_pos, 4117);
    assert_eq!(info.start_time, Time::new(1, 0));
    assert_eq!(info.end_time, Time::new(1, 0));
    assert_eq!(info.message_count(), 1);

    let options = ReadOptions::default();
    let (chunk, index_data) = reader.read_chunk(info, &options).unwrap();
    assert_eq!(chunk.compression, "none");
    assert_eq!(index_data.len(), 1);
    assert_eq!(index_data[0].conn, 0);
    assert_eq!(index_data[0].entries.len(), 1);
    assert_eq!(index_data[0].entries[0].offset, 0);

    let messages = reader.read_chunk_messages(info, &options).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].data, vec![0xDE, 0xAD]);

    // parse(compose(parse(B))) == parse(B)
    let composed = BagComposer::new(&mut reader, &index)
        .compose(&ComposeOptions::default())
        .unwrap();
    assert_eq!(composed, bytes);

    let mut re_reader = BagReader::open(BytesSource::new(composed)).unwrap();
    assert_eq!(re_reader.read_index().unwrap(), index);
}

#[test]
fn test_multi_chunk_bag_round_trip() {
    let connections = vec![
        connection(0, "/imu", "sensor_msgs/Imu"),
        connection(1, "/scan", "sensor_msgs/LaserScan"),
        connection(2, "/imu/raw", "sensor_msgs/Imu"),
    ];
    let first = create_chunk(&[
        message(0, Time::new(10, 0), b"alpha"),
        message(1, Time::new(10, 500), b"beta"),
        message(0, Time::new(11, 0), b"gamma"),
    ])
    .unwrap();
    let second = create_chunk(&[
        message(2, Time::new(12, 0), b"delta"),
        message(1, Time::new(13, 250), b"epsilon"),
    ])
    .unwrap();
    let bytes = assemble_bag(&connections, &[first, second]);

    let mut reader = BagReader::open(BytesSource::new(bytes.clone())).unwrap();
    let index = reader.read_index().unwrap();
    assert_eq!(index.connections.len(), 3);
    assert_eq!(index.chunk_infos.len(), 2);
    assert_eq!(index.chunk_infos[0].message_count(), 3);
    assert_eq!(index.chunk_infos[1].message_count(), 2);

    // second chunk sits right after the first chunk's index data
    let options = ReadOptions::default();
    for info in &index.chunk_infos {
        let (chunk, index_data) = reader.read_chunk(info, &options).unwrap();
        assert_eq!(chunk.size as usize, chunk.data.len());
        let declared: u64 = index_data.iter().map(|i| i.entries.len() as u64).sum();
        assert_eq!(declared, info.message_count());
        for record in &index_data {
            assert!(record
                .entries
                .iter()
                .all(|e| (e.offset as usize) < chunk.data.len()));
            assert!(record
                .entries
                .iter()
                .all(|e| e.time >= info.start_time && e.time <= info.end_time));
        }
    }

    let composed = BagComposer::new(&mut reader, &index)
        .compose(&ComposeOptions::default())
        .unwrap();
    assert_eq!(composed, bytes);

    let mut re_reader = BagReader::open(BytesSource::new(composed)).unwrap();
    assert_eq!(re_reader.read_index().unwrap(), index);
}

#[test]
fn test_connection_metadata_survives_round_trip() {
    let mut rich = connection(4, "/tf", "tf2_msgs/TFMessage");
    rich.callerid = Some("/robot_state_publisher".to_string());
    rich.latching = Some(true);

    let bytes = assemble_bag(&[rich.clone()], &[]);
    let mut reader = BagReader::open(BytesSource::new(bytes)).unwrap();
    let index = reader.read_index().unwrap();
    assert_eq!(index.connections[&4], rich);

    let composed = BagComposer::new(&mut reader, &index)
        .compose(&ComposeOptions::default())
        .unwrap();
    let mut re_reader = BagReader::open(BytesSource::new(composed)).unwrap();
    assert_eq!(re_reader.read_index().unwrap().connections[&4], rich);
}

#[test]
fn test_index_pos_into_chunk_infos_is_opcode_mismatch() {
    let connections = vec![connection(0, "/a", "T")];
    let group = create_chunk(&[message(0, Time::new(1, 0), b"p")]).unwrap();
    let mut bytes = assemble_bag(&connections, &[group]);

    // skip the connection record so index_pos lands on the chunk info
    let mut reader = BagReader::open(BytesSource::new(bytes.clone())).unwrap();
    let index = reader.read_index().unwrap();
    let conn_record_len = {
        let mut buf = Vec::new();
        connections[0].write(&mut buf).unwrap();
        buf.len() as u64
    };
    let skewed = BagHeaderRecord {
        index_pos: index.header.index_pos + conn_record_len,
        ..index.header
    };
    let mut patched = Vec::new();
    skewed.write(&mut patched).unwrap();
    bytes[MAGIC.len()..MAGIC.len() + patched.len()].copy_from_slice(&patched);

    let mut reader = BagReader::open(BytesSource::new(bytes)).unwrap();
    assert!(matches!(
        reader.read_connections_and_chunk_infos(),
        Err(BagError::OpcodeMismatch {
            expected: 0x07,
            found: 0x06,
        })
    ));
}

#[test]
fn test_lenient_mode_skips_unknown_records_in_chunks() {
    use rosbag_rs::header::HeaderFields;
    use rosbag_rs::records::write_record;

    // chunk data: one message followed by a record with an unknown opcode
    let msg = message(0, Time::new(5, 0), b"ok");
    let mut data = Vec::new();
    msg.write(&mut data).unwrap();
    let mut alien = HeaderFields::new();
    alien.insert_op(0x7F);
    write_record(&alien, b"???", &mut data).unwrap();

    let chunk = ChunkRecord {
        compression: "none".to_string(),
        size: data.len() as u32,
        data,
    };
    let index_data = vec![IndexDataRecord {
        ver: 1,
        conn: 0,
        entries: vec![rosbag_rs::IndexEntry {
            time: msg.time,
            offset: 0,
        }],
    }];
    let bytes = assemble_bag(&[connection(0, "/a", "T")], &[(chunk, index_data)]);

    let mut reader = BagReader::open(BytesSource::new(bytes)).unwrap();
    let index = reader.read_index().unwrap();
    let info = &index.chunk_infos[0];

    let strict = ReadOptions::default();
    assert!(matches!(
        reader.read_chunk_messages(info, &strict),
        Err(BagError::UnexpectedOpcode { op: 0x7F, .. })
    ));

    let lenient = ReadOptions {
        lenient: true,
        ..ReadOptions::default()
    };
    let messages = reader.read_chunk_messages(info, &lenient).unwrap();
    assert_eq!(messages, vec![msg]);
}

#[test]
fn test_truncated_bag_is_unexpected_eof() {
    let connections = vec![connection(0, "/a", "T")];
    let group = create_chunk(&[message(0, Time::new(1, 0), b"payload")]).unwrap();
    let bytes = assemble_bag(&connections, &[group]);

    // cut the file in the middle of the summary sections
    let cut = bytes.len() - 10;
    let mut reader = BagReader::open(BytesSource::new(bytes[..cut].to_vec())).unwrap();
    assert!(matches!(
        reader.read_index(),
        Err(BagError::UnexpectedEof { .. })
    ));
}

#[cfg(feature = "lz4")]
#[test]
fn test_lz4_chunk_round_trip() {
    use rosbag_rs::CompressorTable;

    let connections = vec![connection(0, "/a", "T")];
    let (mut chunk, index_data) = create_chunk(&[
        message(0, Time::new(1, 0), &[0x55; 400]),
        message(0, Time::new(2, 0), &[0xAA; 400]),
    ])
    .unwrap();

    // store the chunk compressed; `size` keeps the uncompressed byte count
    let compressors = CompressorTable::with_defaults();
    chunk.data = compressors.compress("lz4", &chunk.data).unwrap();
    chunk.compression = "lz4".to_string();
    let bytes = assemble_bag(&connections, &[(chunk, index_data)]);

    let mut reader = BagReader::open(BytesSource::new(bytes.clone())).unwrap();
    let index = reader.read_index().unwrap();

    let options = ReadOptions::default();
    let (chunk, _) = reader.read_chunk(&index.chunk_infos[0], &options).unwrap();
    assert_eq!(chunk.compression, "lz4");
    assert_eq!(chunk.data.len(), chunk.size as usize);
    let messages = reader
        .read_chunk_messages(&index.chunk_infos[0], &options)
        .unwrap();
    assert_eq!(messages.len(), 2);

    // lz4_flex is deterministic, so the re-composed bag matches byte-for-byte
    let composed = BagComposer::new(&mut reader, &index)
        .compose(&ComposeOptions::default())
        .unwrap();
    assert_eq!(composed, bytes);

    let mut re_reader = BagReader::open(BytesSource::new(composed)).unwrap();
    assert_eq!(re_reader.read_index().unwrap(), index);
}

#[cfg(feature = "bz2")]
#[test]
fn test_bz2_chunk_model_round_trip() {
    use rosbag_rs::CompressorTable;

    let connections = vec![connection(0, "/a", "T")];
    let (mut chunk, index_data) =
        create_chunk(&[message(0, Time::new(7, 0), &[0x42; 1000])]).unwrap();

    let compressors = CompressorTable::with_defaults();
    chunk.data = compressors.compress("bz2", &chunk.data).unwrap();
    chunk.compression = "bz2".to_string();
    let bytes = assemble_bag(&connections, &[(chunk, index_data)]);

    let mut reader = BagReader::open(BytesSource::new(bytes)).unwrap();
    let index = reader.read_index().unwrap();

    let composed = BagComposer::new(&mut reader, &index)
        .compose(&ComposeOptions::default())
        .unwrap();
    let mut re_reader = BagReader::open(BytesSource::new(composed)).unwrap();
    let re_index = re_reader.read_index().unwrap();

    // chunk lengths may change under re-compression; the model must not
    assert_eq!(re_index.connections, index.connections);
    assert_eq!(re_index.chunk_infos.len(), index.chunk_infos.len());
    for (a, b) in re_index.chunk_infos.iter().zip(&index.chunk_infos) {
        assert_eq!(a.start_time, b.start_time);
        assert_eq!(a.end_time, b.end_time);
        assert_eq!(a.entries, b.entries);
    }
    let messages = re_reader
        .read_chunk_messages(&re_index.chunk_infos[0], &ReadOptions::default())
        .unwrap();
    assert_eq!(messages[0].data, vec![0x42; 1000]);
}
