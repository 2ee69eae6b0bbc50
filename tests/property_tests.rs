//! Property tests for record keys, signed envelopes, and bootstrap
//! candidate unification

use proptest::prelude::*;
use roster_core::{
    record_key, Identity, NamespaceValidator, NodeAddr, PeerId, PeerRecord, SignedEnvelope,
};
use roster_registry::bootstrap::unify_candidates;
use std::collections::HashSet;

fn namespace() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}"
}

fn node_addr() -> impl Strategy<Value = NodeAddr> {
    (any::<u8>(), 1024u16..).prop_map(|(byte, port)| {
        NodeAddr::new(
            format!("/ip4/10.0.0.{byte}/tcp/{port}"),
            PeerId::from_bytes([byte; 32]),
        )
    })
}

proptest! {
    #[test]
    fn prop_validator_accepts_well_formed_keys(
        ns in namespace(),
        bytes in prop::array::uniform32(any::<u8>()),
    ) {
        let validator = NamespaceValidator::new(ns.clone());
        let id = PeerId::from_bytes(bytes).to_hex();
        prop_assert!(validator.validate(&record_key(&ns, &id), b"value").is_ok());
    }

    #[test]
    fn prop_validator_rejects_foreign_namespaces(
        ns in namespace(),
        other in namespace(),
        bytes in prop::array::uniform32(any::<u8>()),
    ) {
        prop_assume!(ns != other);
        let validator = NamespaceValidator::new(ns);
        let id = PeerId::from_bytes(bytes).to_hex();
        prop_assert!(validator.validate(&record_key(&other, &id), b"value").is_err());
    }

    #[test]
    fn prop_validator_rejects_short_identity_suffixes(
        ns in namespace(),
        suffix in "[0-9a-f]{0,62}",
    ) {
        let validator = NamespaceValidator::new(ns.clone());
        prop_assert!(validator.validate(&record_key(&ns, &suffix), b"value").is_err());
    }

    #[test]
    fn prop_envelope_round_trip_preserves_record(
        name in "[a-zA-Z0-9 _-]{0,32}",
        version in "[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}",
        metadata in prop::collection::hash_map("[a-z]{1,8}", "[a-zA-Z0-9]{0,16}", 0..4),
    ) {
        let identity = Identity::generate();
        let record = PeerRecord {
            id: identity.peer_id().to_hex(),
            name: name.clone(),
            version: version.clone(),
            metadata: metadata.clone(),
        };

        let envelope = SignedEnvelope::seal(&identity, &record).unwrap();
        let opened = SignedEnvelope::open(&envelope.to_bytes().unwrap()).unwrap();

        prop_assert_eq!(opened.name, name);
        prop_assert_eq!(opened.version, version);
        prop_assert_eq!(envelope.signer(), identity.peer_id());
        // Caller metadata survives sealing
        for (k, v) in &metadata {
            prop_assert_eq!(opened.metadata.get(k), Some(v));
        }
    }

    #[test]
    fn prop_envelope_rejects_foreign_signer(
        name in "[a-zA-Z0-9]{1,16}",
    ) {
        let signer = Identity::generate();
        let impostor = Identity::generate();
        let record = PeerRecord {
            id: signer.peer_id().to_hex(),
            name,
            version: "0.1.0".to_string(),
            metadata: Default::default(),
        };

        let mut envelope = SignedEnvelope::seal(&signer, &record).unwrap();
        envelope.public_key = *impostor.peer_id().as_bytes();
        prop_assert!(SignedEnvelope::open(&envelope.to_bytes().unwrap()).is_err());
    }

    #[test]
    fn prop_unified_candidates_are_duplicate_free_and_complete(
        configured in prop::collection::vec(node_addr(), 0..8),
        defaults in prop::collection::vec(node_addr(), 0..8),
        discovered in prop::collection::vec(node_addr(), 0..8),
    ) {
        let out = unify_candidates(&configured, &defaults, &discovered);

        let out_set: HashSet<String> = out.iter().map(ToString::to_string).collect();
        prop_assert_eq!(out_set.len(), out.len());

        for addr in configured.iter().chain(&defaults).chain(&discovered) {
            prop_assert!(out_set.contains(&addr.to_string()));
        }
        for addr in &out {
            prop_assert!(
                configured.contains(addr) || defaults.contains(addr) || discovered.contains(addr)
            );
        }
    }

    #[test]
    fn prop_node_addr_text_round_trip(addr in node_addr()) {
        let parsed: NodeAddr = addr.to_string().parse().unwrap();
        prop_assert_eq!(parsed, addr);
    }
}
