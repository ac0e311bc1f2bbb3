//! Property tests against one shared live pair per revision.

use nettable::ProtocolRevision;
use nettable_testkit::prelude::*;
use proptest::prelude::*;
use std::sync::OnceLock;

fn pair(revision: ProtocolRevision) -> &'static LivePair {
    static NT2: OnceLock<LivePair> = OnceLock::new();
    static NT3: OnceLock<LivePair> = OnceLock::new();
    match revision {
        ProtocolRevision::Nt2 => NT2.get_or_init(LivePair::nt2),
        ProtocolRevision::Nt3 => NT3.get_or_init(LivePair::nt3),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_value_reaches_server_nt3(
        key in key_name_strategy(),
        value in entry_value_strategy(ProtocolRevision::Nt3),
    ) {
        let pair = pair(ProtocolRevision::Nt3);
        pair.client_table("prop3").put_value(&key, value.clone());
        let server = pair.server_table("prop3");
        prop_assert!(wait_until(DEFAULT_WAIT, || server.get_value(&key).ok() == Some(value.clone())));
    }

    #[test]
    fn any_value_reaches_client_nt2(
        key in key_name_strategy(),
        value in entry_value_strategy(ProtocolRevision::Nt2),
    ) {
        let pair = pair(ProtocolRevision::Nt2);
        pair.server_table("prop2").put_value(&key, value.clone());
        let client = pair.client_table("prop2");
        prop_assert!(wait_until(DEFAULT_WAIT, || client.get_value(&key).ok() == Some(value.clone())));
    }
}
