//! Type registry / Any envelope tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use serde::{Deserialize, Serialize};

use relaywire_core::protocol::any::{AnyEnvelope, PayloadCodec, TypeRegistry};
use relaywire_core::{ClientCode, RelayError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TokenQuote {
    mint: String,
    price_lamports: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BotStatus {
    bot_id: String,
    running: bool,
}

fn registry() -> TypeRegistry {
    let mut r = TypeRegistry::new();
    r.register::<TokenQuote>("type.relaywire/TokenQuote");
    r.register::<BotStatus>("type.relaywire/BotStatus");
    r
}

#[test]
fn pack_unpack_registered_types() {
    let r = registry();

    let quote = TokenQuote { mint: "So1111".into(), price_lamports: 42 };
    let env = r.pack(&quote, None).unwrap();
    assert_eq!(env.type_url, "type.relaywire/TokenQuote");
    assert_eq!(r.unpack::<TokenQuote>(&env, None).unwrap(), quote);

    let status = BotStatus { bot_id: "b1".into(), running: true };
    let env = r.pack(&status, None).unwrap();
    assert_eq!(r.unpack::<BotStatus>(&env, None).unwrap(), status);
}

#[test]
fn unpack_dyn_resolves_by_identifier() {
    let r = registry();
    let env = r.pack(&BotStatus { bot_id: "b2".into(), running: false }, None).unwrap();
    let any = r.unpack_dyn(&env).unwrap();
    let status = any.downcast::<BotStatus>().unwrap();
    assert_eq!(status.bot_id, "b2");
}

#[test]
fn pack_unregistered_without_identifier_is_unresolved() {
    let r = TypeRegistry::new();
    let err = r
        .pack(&TokenQuote { mint: "m".into(), price_lamports: 1 }, None)
        .unwrap_err();
    assert!(matches!(err, RelayError::UnresolvedType(_)));
    assert_eq!(err.client_code(), ClientCode::UnresolvedType);
}

#[test]
fn explicit_identifier_wins_over_registry() {
    let r = registry();
    let env = r
        .pack(&TokenQuote { mint: "m".into(), price_lamports: 1 }, Some("custom/Quote"))
        .unwrap();
    assert_eq!(env.type_url, "custom/Quote");

    // Not registered under that identifier, so only an explicit decoder works.
    assert!(matches!(
        r.unpack::<TokenQuote>(&env, None).unwrap_err(),
        RelayError::UnknownType(_)
    ));
    let decoded = r.unpack::<TokenQuote>(&env, Some(TokenQuote::decode_payload)).unwrap();
    assert_eq!(decoded.price_lamports, 1);
}

#[test]
fn unknown_type_url_is_reported() {
    let r = registry();
    let env = AnyEnvelope { type_url: "type.relaywire/Nope".into(), value: b"{}".to_vec() };
    let err = r.unpack_dyn(&env).unwrap_err();
    assert_eq!(err.client_code(), ClientCode::UnknownType);
}

#[test]
fn re_registering_a_type_replaces_both_directions() {
    let mut r = registry();
    r.register::<TokenQuote>("type.relaywire/TokenQuoteV2");

    assert_eq!(r.resolve_by_type::<TokenQuote>(), Some("type.relaywire/TokenQuoteV2"));
    assert!(r.resolve_by_identifier("type.relaywire/TokenQuote").is_none());
    assert_eq!(r.len(), 2);
}

#[test]
fn re_registering_an_identifier_drops_the_old_type() {
    let mut r = registry();
    r.register::<BotStatus>("type.relaywire/TokenQuote");

    assert!(r.resolve_by_type::<TokenQuote>().is_none());
    assert_eq!(r.resolve_by_type::<BotStatus>(), Some("type.relaywire/TokenQuote"));
}

#[test]
fn mismatched_target_type_is_an_error() {
    let r = registry();
    let env = r.pack(&BotStatus { bot_id: "b".into(), running: true }, None).unwrap();
    assert!(r.unpack::<TokenQuote>(&env, None).is_err());
}

#[test]
fn envelope_value_is_base64_in_json() {
    let env = AnyEnvelope { type_url: "t".into(), value: vec![0xde, 0xad] };
    let json = serde_json::to_value(&env).unwrap();
    assert_eq!(json["typeUrl"], "t");
    assert_eq!(json["value"], "3q0=");
    let back: AnyEnvelope = serde_json::from_value(json).unwrap();
    assert_eq!(back, env);
}
