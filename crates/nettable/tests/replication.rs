//! Replication between a live server and client.

use nettable::{ChangeKind, CoreError, EntryValue, Origin, ProtocolRevision};
use nettable_testkit::prelude::*;
use std::time::Duration;

#[test]
fn never_written_keys() {
    let pair = LivePair::nt3();
    let table = pair.client_table("t1");

    assert!(matches!(
        table.get_boolean("nope"),
        Err(CoreError::KeyNotFound { .. })
    ));
    assert!(table.get_number("nope").unwrap_err().is_not_found());
    assert!(table.get_string("nope").unwrap_err().is_not_found());
    assert!(table.get_raw("nope").unwrap_err().is_not_found());
    assert!(table.get_boolean_array("nope").unwrap_err().is_not_found());
    assert!(table.get_number_array("nope").unwrap_err().is_not_found());
    assert!(table.get_string_array("nope").unwrap_err().is_not_found());
    assert!(table.get_value("nope").unwrap_err().is_not_found());

    assert!(table.get_boolean_or("nope", true));
    assert_eq!(table.get_number_or("nope", 42.5), 42.5);
    assert_eq!(table.get_string_or("nope", "dflt"), "dflt");
    assert_eq!(table.get_raw_or("nope", &[1, 2]), vec![1, 2]);
    assert_eq!(table.get_boolean_array_or("nope", &[true, false]), vec![true, false]);
    assert_eq!(table.get_number_array_or("nope", &[3.0]), vec![3.0]);
    assert_eq!(
        table.get_string_array_or("nope", &["a", "b"]),
        vec!["a".to_string(), "b".to_string()]
    );
}

fn typed_values_reach_peer(pair: &LivePair) {
    let server = pair.server_table("types");
    let client = pair.client_table("types");

    server.put_boolean("bool", true);
    server.put_number("num", -12.75);
    server.put_string("str", "hello");
    server.put_boolean_array("bools", &[true, false, true]);
    server.put_number_array("nums", &[3.0, 1.0, 2.0]);
    server.put_string_array("strs", &["z", "a", "m"]);

    assert!(wait_until(DEFAULT_WAIT, || client.contains_key("strs")));
    assert!(client.get_boolean("bool").unwrap());
    assert_eq!(client.get_number("num").unwrap(), -12.75);
    assert_eq!(client.get_string("str").unwrap(), "hello");
    assert_eq!(client.get_boolean_array("bools").unwrap(), vec![true, false, true]);
    assert_eq!(client.get_number_array("nums").unwrap(), vec![3.0, 1.0, 2.0]);
    assert_eq!(
        client.get_string_array("strs").unwrap(),
        vec!["z".to_string(), "a".to_string(), "m".to_string()]
    );
}

#[test]
fn typed_values_replicate_nt3() {
    let pair = LivePair::nt3();
    typed_values_reach_peer(&pair);

    pair.client_table("types").put_raw("raw", &[0, 255, 7]);
    let server = pair.server_table("types");
    assert!(wait_until(DEFAULT_WAIT, || server.contains_key("raw")));
    assert_eq!(server.get_raw("raw").unwrap(), vec![0, 255, 7]);
}

#[test]
fn typed_values_replicate_nt2() {
    let pair = LivePair::nt2();
    typed_values_reach_peer(&pair);
}

#[test]
fn raw_values_stay_local_on_nt2() {
    let pair = LivePair::nt2();
    pair.server_table("t").put_raw("blob", &[1, 2, 3]);
    pair.server_table("t").put_boolean("marker", true);

    let client = pair.client_table("t");
    assert!(wait_until(DEFAULT_WAIT, || client.contains_key("marker")));
    assert!(!client.contains_key("blob"));
}

#[test]
fn sequential_writes_notify_each_time() {
    const WRITES: usize = 25;
    let pair = LivePair::nt3();
    let events = pair.server.subscribe(Some("/t1/counter"));
    let client = pair.client_table("t1");

    for i in 0..WRITES {
        client.put_number("counter", i as f64);
    }

    let received = expect_changes(&events, WRITES, DEFAULT_WAIT);
    assert!(received[0].is_new());
    assert!(received[1..].iter().all(|e| e.kind == ChangeKind::Updated));
    assert!(received
        .iter()
        .all(|e| matches!(e.origin, Origin::Remote(_))));
    assert_eq!(
        pair.server_table("t1").get_number("counter").unwrap(),
        (WRITES - 1) as f64
    );
    expect_no_changes(&events, Duration::from_millis(100));
}

#[test]
fn unicode_strings_round_trip() {
    for revision in ProtocolRevision::ALL {
        let pair = LivePair::start(revision, revision);
        let client = pair.client_table("t1");
        let server = pair.server_table("t1");

        for text in ["\u{A9}", "\u{2122}"] {
            client.put_string("text", text);
            assert!(wait_until(DEFAULT_WAIT, || server.get_string_or("text", "") == text));
            assert_eq!(server.get_string("text").unwrap().as_bytes(), text.as_bytes());
        }
    }
}

/// Writes the seven-entry set on `writer` and checks `reader` sees exactly
/// seven new entries with matching typed values.
fn seven_entries(writer: &nettable::NetworkTables, reader: &nettable::NetworkTables) {
    let events = reader.subscribe(Some("/t1/"));
    let t1 = writer.get_table("t1");

    t1.put_boolean("bool", true);
    t1.put_number("number1", 1.0);
    t1.put_number("number2", 1.5);
    t1.put_string("string", "string");
    t1.put_boolean_array("ba", &[true, false]);
    t1.put_number_array("na", &[1.0, 2.0]);
    t1.put_string_array("sa", &["s", "t"]);

    let received = expect_changes(&events, 7, DEFAULT_WAIT);
    assert!(received.iter().all(|e| e.is_new()));
    expect_no_changes(&events, Duration::from_millis(200));

    let t2 = reader.get_table("t1");
    assert!(t2.get_boolean("bool").unwrap());
    assert_eq!(t2.get_number("number1").unwrap(), 1.0);
    assert_eq!(t2.get_number("number2").unwrap(), 1.5);
    assert_eq!(t2.get_string("string").unwrap(), "string");
    assert_eq!(t2.get_boolean_array("ba").unwrap(), vec![true, false]);
    assert_eq!(t2.get_number_array("na").unwrap(), vec![1.0, 2.0]);
    assert_eq!(
        t2.get_string_array("sa").unwrap(),
        vec!["s".to_string(), "t".to_string()]
    );
    assert_eq!(t2.get_keys().len(), 7);
}

#[test]
fn seven_entry_scenario_client_to_server() {
    let pair = LivePair::nt3();
    seven_entries(&pair.client, &pair.server);
}

#[test]
fn seven_entry_scenario_server_to_client() {
    for revision in ProtocolRevision::ALL {
        let pair = LivePair::start(revision, revision);
        seven_entries(&pair.server, &pair.client);
    }
}

#[test]
fn server_relays_between_clients() {
    let pair = LivePair::nt3();
    let second = nettable::NetworkTables::client(fast_client_config(
        pair.addr,
        ProtocolRevision::Nt2,
    ))
    .unwrap();
    second.start().unwrap();
    assert!(wait_until(DEFAULT_WAIT, || second.is_connected()));

    pair.client_table("shared").put_string("from", "nt3 client");
    let table = second.get_table("shared");
    assert!(wait_until(DEFAULT_WAIT, || table.contains_key("from")));
    assert_eq!(table.get_string("from").unwrap(), "nt3 client");

    table.put_number("reply", 2.0);
    let first = pair.client_table("shared");
    assert!(wait_until(DEFAULT_WAIT, || first.get_number_or("reply", 0.0) == 2.0));
    assert_eq!(pair.server.connections().len(), 2);
}

#[test]
fn type_change_replicates() {
    let pair = LivePair::nt2();
    let server = pair.server_table("t");
    let client = pair.client_table("t");

    server.put_number("value", 1.0);
    assert!(wait_until(DEFAULT_WAIT, || client.contains_key("value")));
    server.put_string("value", "text now");
    assert!(wait_until(DEFAULT_WAIT, || client.get_string("value").is_ok()));
    server.put_string("value", "and again");
    assert!(wait_until(DEFAULT_WAIT, || client.get_string_or("value", "") == "and again"));

    let err = client.get_number("value").unwrap_err();
    assert!(matches!(err, CoreError::TypeMismatch { .. }));
    assert_eq!(client.get_number_or("value", -1.0), -1.0);
}

#[test]
fn persistent_flag_replicates_on_nt3() {
    let pair = LivePair::nt3();
    let server = pair.server_table("cfg");
    let client = pair.client_table("cfg");

    server.put_number("gain", 0.5);
    assert!(wait_until(DEFAULT_WAIT, || client.contains_key("gain")));
    server.set_persistent("gain");
    assert!(wait_until(DEFAULT_WAIT, || client.is_persistent("gain")));

    client.clear_persistent("gain");
    assert!(wait_until(DEFAULT_WAIT, || !server.is_persistent("gain")));
    assert_eq!(
        pair.server.store().get("/cfg/gain"),
        Some(EntryValue::Number(0.5))
    );
}
