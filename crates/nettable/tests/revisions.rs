//! Behaviour that depends on the negotiated revision.

use nettable::ProtocolRevision::{self, Nt2, Nt3};
use nettable_testkit::prelude::*;
use std::time::Duration;

/// Returns the revision a pair ends up speaking.
fn negotiated(server_max: ProtocolRevision, client: ProtocolRevision) -> ProtocolRevision {
    server_max.min(client)
}

#[test]
fn delete_visibility_follows_minimum_revision() {
    for (server_max, client_rev) in [(Nt3, Nt3), (Nt3, Nt2), (Nt2, Nt3), (Nt2, Nt2)] {
        let pair = LivePair::start(server_max, client_rev);
        let server = pair.server_table("t1");
        let client = pair.client_table("t1");

        server.put_number("doomed", 1.0);
        server.put_number("marker", 0.0);
        assert!(wait_until(DEFAULT_WAIT, || client.contains_key("marker")));

        server.delete("doomed");
        server.put_number("marker", 1.0);
        assert!(wait_until(DEFAULT_WAIT, || client.get_number_or("marker", 0.0) == 1.0));

        let expect_deleted = negotiated(server_max, client_rev) == Nt3;
        assert_eq!(
            !client.contains_key("doomed"),
            expect_deleted,
            "server {server_max}, client {client_rev}"
        );
    }
}

/// Deletes `bool` on `writer` and checks what `reader` observes.
fn delete_then_write(
    writer: &nettable::NetworkTables,
    reader: &nettable::NetworkTables,
    propagated: bool,
    label: &str,
) {
    let w = writer.get_table("del");
    let r = reader.get_table("del");
    w.put_boolean("bool", false);
    assert!(wait_until(DEFAULT_WAIT, || r.contains_key("bool")), "{label}");

    let events = reader.subscribe(Some("/del/"));
    if propagated {
        w.delete("bool");
        let received = expect_changes(&events, 1, DEFAULT_WAIT);
        assert!(received[0].is_deleted(), "{label}");
        assert!(r.get_boolean("bool").unwrap_err().is_not_found(), "{label}");
    } else {
        w.delete("bool");
        w.put_boolean("ooo", true);
        let received = expect_changes(&events, 1, DEFAULT_WAIT);
        assert_eq!(received[0].key, "/del/ooo", "{label}");
        assert!(!r.get_boolean("bool").unwrap(), "{label}");
    }
    expect_no_changes(&events, Duration::from_millis(100));
}

#[test]
fn deletes_from_either_side_notify_once() {
    for (server_max, client_rev) in [(Nt3, Nt3), (Nt3, Nt2), (Nt2, Nt3), (Nt2, Nt2)] {
        let propagated = negotiated(server_max, client_rev) == Nt3;

        let pair = LivePair::start(server_max, client_rev);
        let label = format!("server {server_max} -> client {client_rev}");
        delete_then_write(&pair.server, &pair.client, propagated, &label);

        let pair = LivePair::start(server_max, client_rev);
        let label = format!("client {client_rev} -> server {server_max}");
        delete_then_write(&pair.client, &pair.server, propagated, &label);
    }
}

#[test]
fn recreating_deleted_key_overrides_stale_copy() {
    let pair = LivePair::nt2();
    let server = pair.server_table("t1");
    let client = pair.client_table("t1");

    server.put_number("k", 1.0);
    server.put_number("k", 2.0);
    assert!(wait_until(DEFAULT_WAIT, || client.get_number_or("k", 0.0) == 2.0));

    server.delete("k");
    server.put_number("k", 3.0);
    assert!(wait_until(DEFAULT_WAIT, || client.get_number_or("k", 0.0) == 3.0));
}

#[test]
fn client_delete_reaches_server_on_nt3() {
    let pair = LivePair::nt3();
    let server = pair.server_table("t1");
    let client = pair.client_table("t1");

    client.put_boolean("flag", true);
    assert!(wait_until(DEFAULT_WAIT, || server.contains_key("flag")));
    client.delete("flag");
    assert!(wait_until(DEFAULT_WAIT, || !server.contains_key("flag")));

    // Re-creating the key after the delete works both ways.
    client.put_boolean("flag", false);
    assert!(wait_until(DEFAULT_WAIT, || !server.get_boolean_or("flag", true)));
}

#[test]
fn delete_all_propagates_on_nt3_only() {
    for revision in ProtocolRevision::ALL {
        let pair = LivePair::start(revision, revision);
        let server = pair.server_table("t1");
        let client = pair.client_table("t1");

        server.put_number("a", 1.0);
        server.put_number("b", 2.0);
        assert!(wait_until(DEFAULT_WAIT, || client.contains_key("b")));

        assert_eq!(pair.server.delete_all_entries(), 2);
        server.put_number("marker", 1.0);
        assert!(wait_until(DEFAULT_WAIT, || client.contains_key("marker")));
        std::thread::sleep(Duration::from_millis(50));

        let expected = match revision {
            Nt3 => vec!["marker".to_string()],
            Nt2 => vec!["a".to_string(), "b".to_string(), "marker".to_string()],
        };
        assert_eq!(client.get_keys(), expected, "revision {revision}");
    }
}

#[test]
fn client_downgrades_and_reports_revision() {
    let pair = LivePair::start(Nt2, Nt3);
    let connections = pair.server.connections();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].revision, Some(Nt2));
    // Revision 2.0 has no hello identity.
    assert_eq!(connections[0].remote_identity, "");
}

#[test]
fn nt3_identity_is_exchanged() {
    let pair = LivePair::nt3();
    let server_side = pair.server.connections();
    assert_eq!(server_side[0].remote_identity, "testkit-client");
    let client_side = pair.client.connections();
    assert_eq!(client_side[0].remote_identity, "testkit-server");
}
