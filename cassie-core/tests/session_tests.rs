//! Session and operation tests against the in-memory cluster
//!
//! Run with: cargo test -p cassie-core --test session_tests

use cassie_core::{
    mock_transport::{ColumnFamilyKind, MockCluster, RecordedCall},
    transport::{ColumnPath, TransportError},
    Blob, BlobRef, CassieError, ClientConfig, Column, ConsistencyLevel, ErrorCode, Session,
};
use std::time::Duration;

fn cluster() -> MockCluster {
    MockCluster::new("Test Cluster").with_keyspace(
        "Keyspace1",
        &[
            ("Standard2", ColumnFamilyKind::Standard),
            ("Super1", ColumnFamilyKind::Super),
        ],
    )
}

fn connect(cluster: &MockCluster) -> Session {
    Session::connect(&cluster.connector(), "localhost", 9160, None).unwrap()
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[test]
    fn test_connect_failure_yields_no_session() {
        let cluster = cluster();
        cluster.set_reachable(false);

        let err = Session::connect(&cluster.connector(), "localhost", 9160, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Transport);
        assert_eq!(cluster.open_connections(), 0);
    }

    #[test]
    fn test_connect_blob() {
        let cluster = cluster();
        let session =
            Session::connect_blob(&cluster.connector(), BlobRef::from("localhost"), 9160, None)
                .unwrap();
        assert_eq!(session.host(), "localhost");

        let err = Session::connect_blob(
            &cluster.connector(),
            BlobRef::new(&[b'h', 0xff]),
            9160,
            None,
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Other);
    }

    #[test]
    fn test_drop_and_close_release_the_connection() {
        let cluster = cluster();
        {
            let _session = connect(&cluster);
            assert_eq!(cluster.open_connections(), 1);
        }
        assert_eq!(cluster.open_connections(), 0);

        let session = connect(&cluster);
        assert_eq!(cluster.open_connections(), 1);
        session.close();
        assert_eq!(cluster.open_connections(), 0);
        assert_eq!(cluster.last_call(), Some(RecordedCall::Close));
    }

    #[test]
    fn test_from_config_applies_timeouts_and_keyspace() {
        let cluster = cluster();
        let config = ClientConfig {
            recv_timeout_ms: Some(1500),
            send_timeout_ms: Some(500),
            keyspace: Some("Keyspace1".to_string()),
            ..ClientConfig::default()
        };

        let session = Session::from_config(&cluster.connector(), &config).unwrap();
        assert_eq!(session.keyspace(), Some("Keyspace1"));
        assert_eq!(
            cluster.calls(),
            vec![
                RecordedCall::SetRecvTimeout(Some(Duration::from_millis(1500))),
                RecordedCall::SetSendTimeout(Some(Duration::from_millis(500))),
                RecordedCall::SetKeyspace {
                    keyspace: "Keyspace1".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_configured_consistency_reaches_the_transport() {
        let cluster = cluster();
        let config = ClientConfig {
            keyspace: Some("Keyspace1".to_string()),
            consistency: ConsistencyLevel::Quorum,
            ..ClientConfig::default()
        };

        let mut session = Session::from_config(&cluster.connector(), &config).unwrap();
        session
            .insert(
                "Keyspace1",
                "Standard2",
                "joe",
                &Column::new("age", "40", 1),
                config.consistency_or(None),
            )
            .unwrap();

        match cluster.last_call() {
            Some(RecordedCall::Insert { consistency, .. }) => {
                assert_eq!(consistency, ConsistencyLevel::Quorum)
            }
            other => panic!("expected an insert, got {:?}", other),
        }
    }

    #[test]
    fn test_from_config_with_unknown_keyspace_fails() {
        let cluster = cluster();
        let config = ClientConfig {
            keyspace: Some("Nope".to_string()),
            ..ClientConfig::default()
        };

        let err = Session::from_config(&cluster.connector(), &config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        assert_eq!(cluster.open_connections(), 0);
    }

    #[test]
    fn test_session_moves_between_threads() {
        let cluster = cluster();
        let mut session = connect(&cluster);

        let handle = std::thread::spawn(move || {
            session.set_keyspace("Keyspace1").unwrap();
            session
        });
        let session = handle.join().unwrap();
        assert_eq!(session.keyspace(), Some("Keyspace1"));
    }
}

#[cfg(test)]
mod operation_tests {
    use super::*;

    #[test]
    fn test_round_trip_is_byte_identical() {
        let cluster = cluster();
        let mut session = connect(&cluster);

        let name = b"n\0\xffame\r\n".to_vec();
        let value = vec![0u8, 1, 2, 0, 255, 0];
        let column = Column::new(name.clone(), value.clone(), 1234);

        session
            .insert("Keyspace1", "Standard2", "joe", &column, ConsistencyLevel::One)
            .unwrap();
        // The caller still owns the column after the insert
        assert_eq!(column.name.len(), name.len());

        let read = session
            .get("Keyspace1", "Standard2", "joe", &name, ConsistencyLevel::One)
            .unwrap()
            .expect("column should exist");

        assert_eq!(read.name.len(), name.len());
        assert_eq!(read.name.as_bytes(), &name[..]);
        assert_eq!(read.value.len(), value.len());
        assert_eq!(read.value.as_bytes(), &value[..]);
        assert_eq!(read.timestamp, 1234);
    }

    #[test]
    fn test_missing_column_is_none_without_error() {
        let cluster = cluster();
        let mut session = connect(&cluster);

        session.set_keyspace("Nope").unwrap_err();
        assert_eq!(session.last_error_code(), ErrorCode::InvalidRequest);

        let read = session
            .get("Keyspace1", "Standard2", "nobody", "age", ConsistencyLevel::One)
            .unwrap();
        assert!(read.is_none());
        assert_eq!(session.last_error_code(), ErrorCode::None);
        assert!(session.last_error_message().is_none());
    }

    #[test]
    fn test_write_to_unknown_keyspace_is_invalid_request() {
        let cluster = cluster();
        let mut session = connect(&cluster);
        let column = Column::new("age", "40", 0);

        let err = session
            .insert("NoSuchKeyspace", "Standard2", "joe", &column, ConsistencyLevel::One)
            .unwrap_err();
        assert!(matches!(err, CassieError::InvalidRequest { .. }));
        assert_eq!(session.last_error_code(), ErrorCode::InvalidRequest);
        assert_eq!(session.last_error(), Some(&err));

        let err = session
            .insert("Keyspace1", "NoSuchCF", "joe", &column, ConsistencyLevel::One)
            .unwrap_err();
        assert!(err.to_string().contains("NoSuchCF"));
    }

    #[test]
    fn test_disconnect_then_retry_is_transport_error() {
        let cluster = cluster();
        let mut session = connect(&cluster);
        let column = Column::new("age", "40", 0);

        session
            .insert("Keyspace1", "Standard2", "joe", &column, ConsistencyLevel::One)
            .unwrap();

        cluster.disconnect();
        for _ in 0..2 {
            let err = session
                .get("Keyspace1", "Standard2", "joe", "age", ConsistencyLevel::One)
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::Transport);
            assert!(err.is_retriable());
            assert_eq!(session.last_error_code(), ErrorCode::Transport);
        }

        cluster.reconnect();
        assert!(session
            .get("Keyspace1", "Standard2", "joe", "age", ConsistencyLevel::One)
            .unwrap()
            .is_some());
        assert_eq!(session.last_error_code(), ErrorCode::None);
    }

    #[test]
    fn test_other_failures_keep_their_kind() {
        let cluster = cluster();
        let mut session = connect(&cluster);

        cluster.fail_next(TransportError::other("TimedOutException", "no response in time"));
        let err = session
            .remove("Standard2", "joe", None, None, ConsistencyLevel::All)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Other);
        assert_eq!(
            session.last_error_message().as_deref(),
            Some("Exception TimedOutException: no response in time")
        );
    }

    #[test]
    fn test_error_state_is_overwritten_not_accumulated() {
        let cluster = cluster();
        let mut session = connect(&cluster);

        session.set_keyspace("Nope").unwrap_err();
        cluster.disconnect();
        session.set_keyspace("Keyspace1").unwrap_err();
        assert_eq!(session.last_error_code(), ErrorCode::Transport);

        cluster.reconnect();
        session.set_keyspace("Keyspace1").unwrap();
        assert_eq!(session.last_error_code(), ErrorCode::None);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn test_remove_uses_current_keyspace() {
        let cluster = cluster();
        let mut session = connect(&cluster);
        let column = Column::new("age", "40", 0);
        session
            .insert("Keyspace1", "Standard2", "joe", &column, ConsistencyLevel::One)
            .unwrap();

        // No keyspace selected yet
        let err = session
            .remove("Standard2", "joe", None, Some("age".into()), ConsistencyLevel::One)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);

        session.set_keyspace("Keyspace1").unwrap();
        session
            .remove("Standard2", "joe", None, Some("age".into()), ConsistencyLevel::One)
            .unwrap();
        assert!(session
            .get("Keyspace1", "Standard2", "joe", "age", ConsistencyLevel::One)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_remove_whole_row() {
        let cluster = cluster();
        let mut session = connect(&cluster);
        session.set_keyspace("Keyspace1").unwrap();

        for (name, value) in [("age", "40"), ("city", "Montreal")] {
            session
                .insert(
                    "Keyspace1",
                    "Standard2",
                    "joe",
                    &Column::new(name, value, 0),
                    ConsistencyLevel::One,
                )
                .unwrap();
        }
        assert_eq!(cluster.cell_count("Keyspace1", "Standard2", b"joe"), 2);

        session
            .remove("Standard2", "joe", None, None, ConsistencyLevel::One)
            .unwrap();
        assert_eq!(cluster.cell_count("Keyspace1", "Standard2", b"joe"), 0);
    }

    #[test]
    fn test_super_column_operations() {
        let cluster = cluster();
        let mut session = connect(&cluster);
        session.set_keyspace("Keyspace1").unwrap();

        for (name, value) in [("city", "Montreal"), ("zip", "H2X")] {
            session
                .insert_super(
                    "Keyspace1",
                    "Super1",
                    "joe",
                    "address",
                    &Column::new(name, value, 1),
                    ConsistencyLevel::Quorum,
                )
                .unwrap();
        }
        session
            .insert_super(
                "Keyspace1",
                "Super1",
                "joe",
                "work",
                &Column::new("city", "Laval", 1),
                ConsistencyLevel::Quorum,
            )
            .unwrap();

        let address = session
            .get_super_column("Keyspace1", "Super1", "joe", "address", ConsistencyLevel::Quorum)
            .unwrap()
            .unwrap();
        assert_eq!(address.name, Blob::from("address"));
        assert_eq!(address.column_count(), 2);
        assert_eq!(address.find("zip").unwrap().value, Blob::from("H2X"));

        let city = session
            .get_in_super("Keyspace1", "Super1", "joe", "work", "city", ConsistencyLevel::Quorum)
            .unwrap()
            .unwrap();
        assert_eq!(city.value, Blob::from("Laval"));

        // Dropping one sub-column leaves the rest of the super-column
        session
            .remove(
                "Super1",
                "joe",
                Some("address".into()),
                Some("zip".into()),
                ConsistencyLevel::Quorum,
            )
            .unwrap();
        let address = session
            .get_super_column("Keyspace1", "Super1", "joe", "address", ConsistencyLevel::Quorum)
            .unwrap()
            .unwrap();
        assert_eq!(address.column_count(), 1);

        // Dropping the super-column leaves the other super-columns
        session
            .remove("Super1", "joe", Some("address".into()), None, ConsistencyLevel::Quorum)
            .unwrap();
        assert!(session
            .get_super_column("Keyspace1", "Super1", "joe", "address", ConsistencyLevel::Quorum)
            .unwrap()
            .is_none());
        assert!(session
            .get_super_column("Keyspace1", "Super1", "joe", "work", ConsistencyLevel::Quorum)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_super_column_into_standard_family_is_rejected() {
        let cluster = cluster();
        let mut session = connect(&cluster);

        let err = session
            .insert_super(
                "Keyspace1",
                "Standard2",
                "joe",
                "address",
                &Column::new("city", "Montreal", 1),
                ConsistencyLevel::One,
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[test]
    fn test_describe_and_print_debug() {
        let cluster = cluster();
        let mut session = connect(&cluster);

        let description = session.describe().unwrap();
        assert_eq!(description.cluster_name, "Test Cluster");
        assert_eq!(description.keyspaces, vec!["Keyspace1", "system"]);

        let mut out = Vec::new();
        session.print_debug(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("\tcluster name: Test Cluster\n"));
        assert!(text.contains("\tkeyspace: Keyspace1\n"));

        cluster.disconnect();
        let mut out = Vec::new();
        session.print_debug(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Exception caught: "));
        assert_eq!(session.last_error_code(), ErrorCode::Transport);
    }

    #[test]
    fn test_timeouts_are_forwarded() {
        let cluster = cluster();
        let mut session = connect(&cluster);

        session.set_recv_timeout(Some(Duration::from_millis(200)));
        session.set_send_timeout(None);

        assert_eq!(
            cluster.calls(),
            vec![
                RecordedCall::SetRecvTimeout(Some(Duration::from_millis(200))),
                RecordedCall::SetSendTimeout(None),
            ]
        );
    }
}

#[cfg(test)]
mod plumbing_tests {
    use super::*;

    #[test]
    fn test_remove_distinguishes_absent_from_empty_super_column() {
        let cluster = cluster();
        let mut session = connect(&cluster);
        session.set_keyspace("Keyspace1").unwrap();
        cluster.clear_calls();

        session
            .remove("Super1", "joe", None, None, ConsistencyLevel::One)
            .unwrap();
        session
            .remove("Super1", "joe", Some(BlobRef::from("")), None, ConsistencyLevel::One)
            .unwrap();

        let paths: Vec<ColumnPath> = cluster
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                RecordedCall::Remove { path, .. } => Some(path),
                _ => None,
            })
            .collect();

        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].super_column, None);
        assert_eq!(paths[1].super_column, Some(Vec::new()));
        assert_ne!(paths[0], paths[1]);
    }

    #[test]
    fn test_consistency_level_reaches_transport_unmodified() {
        let cluster = cluster();
        let mut session = connect(&cluster);
        session.set_keyspace("Keyspace1").unwrap();
        let column = Column::new("age", "40", 0);

        for level in ConsistencyLevel::ALL {
            cluster.clear_calls();

            session
                .insert("Keyspace1", "Standard2", "joe", &column, level)
                .unwrap();
            session
                .get("Keyspace1", "Standard2", "joe", "age", level)
                .unwrap();
            session
                .remove("Standard2", "joe", None, Some("age".into()), level)
                .unwrap();

            let seen: Vec<ConsistencyLevel> = cluster
                .calls()
                .into_iter()
                .filter_map(|call| match call {
                    RecordedCall::Insert { consistency, .. }
                    | RecordedCall::Get { consistency, .. }
                    | RecordedCall::Remove { consistency, .. } => Some(consistency),
                    _ => None,
                })
                .collect();
            assert_eq!(seen, vec![level, level, level], "level {}", level);
        }
    }

    #[test]
    fn test_insert_sends_column_as_given() {
        let cluster = cluster();
        let mut session = connect(&cluster);
        let column = Column::new("age\r\n", "40\r\n", 0);

        session
            .insert("Keyspace1", "Standard2", "joe", &column, ConsistencyLevel::One)
            .unwrap();

        match cluster.last_call() {
            Some(RecordedCall::Insert {
                keyspace,
                key,
                parent,
                column: sent,
                ..
            }) => {
                assert_eq!(keyspace.as_deref(), Some("Keyspace1"));
                assert_eq!(key, b"joe".to_vec());
                assert_eq!(parent.column_family, "Standard2");
                assert!(parent.super_column.is_none());
                assert_eq!(sent, column.to_wire());
            }
            other => panic!("Expected an insert, got {:?}", other),
        }
    }
}

#[cfg(test)]
mod scenario_tests {
    use super::*;

    #[test]
    fn test_repeated_insert_get_cycles() {
        let cluster = cluster();
        let mut session = connect(&cluster);
        session.set_keyspace("Keyspace1").unwrap();

        for _ in 0..10_000 {
            let col_in = Column::new(Blob::from("age"), Blob::from("40"), 0);
            session
                .insert("Keyspace1", "Standard2", "joe", &col_in, ConsistencyLevel::One)
                .unwrap();
            drop(col_in);

            let col_out = session
                .get("Keyspace1", "Standard2", "joe", "age", ConsistencyLevel::One)
                .unwrap()
                .expect("column should round-trip");
            assert_eq!(col_out.name.as_bytes(), b"age");
            assert_eq!(col_out.value.as_bytes(), b"40");
            assert_eq!(session.last_error_code(), ErrorCode::None);
        }

        assert_eq!(cluster.cell_count("Keyspace1", "Standard2", b"joe"), 1);
    }

    #[test]
    fn test_session_per_generation() {
        let cluster = cluster();

        for _ in 0..5 {
            let mut session = connect(&cluster);
            let col_in = Column::new("age\r\n", "40\r\n", 0);
            session
                .insert("Keyspace1", "Standard2", "joe", &col_in, ConsistencyLevel::One)
                .unwrap();
            let col_out = session
                .get("Keyspace1", "Standard2", "joe", "age\r\n", ConsistencyLevel::One)
                .unwrap()
                .unwrap();
            assert_eq!(col_out.name.len(), 5);
            assert_eq!(col_out.value.len(), 4);
            session.close();
        }

        assert_eq!(cluster.open_connections(), 0);
    }
}
