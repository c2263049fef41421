//! Integration tests for the hybrid key bundle
//! Round-trip laws and identity invariants

use qlink_pqc::{
    HybridKeyPair, HybridPublicKey, KemKeyPair, KEM_CIPHERTEXT_SIZE, KEM_PUBLIC_KEY_SIZE,
    KEM_SHARED_SECRET_SIZE,
};

#[test]
fn test_kem_sizes_match_fips_203() {
    let keypair = KemKeyPair::generate().unwrap();
    assert_eq!(keypair.encap_key.to_bytes().len(), KEM_PUBLIC_KEY_SIZE);

    let output = keypair.encap_key.encapsulate().unwrap();
    assert_eq!(output.ciphertext.len(), KEM_CIPHERTEXT_SIZE);
    assert_eq!(output.shared_secret.len(), KEM_SHARED_SECRET_SIZE);

    let recovered = keypair.decap_key.decapsulate(&output.ciphertext).unwrap();
    assert_eq!(output.shared_secret, recovered);
}

#[test]
fn test_two_encapsulations_differ() {
    let keypair = KemKeyPair::generate().unwrap();
    let a = keypair.encap_key.encapsulate().unwrap();
    let b = keypair.encap_key.encapsulate().unwrap();
    assert_ne!(a.ciphertext, b.ciphertext);
    assert_ne!(a.shared_secret, b.shared_secret);
}

#[test]
fn test_signature_bytes_may_vary_but_both_verify() {
    // ECDSA signing is randomized; the verification semantics are what
    // must be deterministic.
    let pair = HybridKeyPair::generate().unwrap();
    let sig_a = pair.sign(b"same message").unwrap();
    let sig_b = pair.sign(b"same message").unwrap();

    assert!(pair.verify(b"same message", &sig_a));
    assert!(pair.verify(b"same message", &sig_b));
}

#[test]
fn test_jwk_round_trip_law() {
    let pair = HybridKeyPair::generate().unwrap();
    let record = pair.to_record();

    // ToJWK . FromJWK = id
    let public = HybridPublicKey::from_record(&record).unwrap();
    assert_eq!(public.to_record(), record);

    // The parsed half interoperates with the original private half
    let out = public.encapsulate().unwrap();
    assert_eq!(pair.decapsulate(&out.ciphertext).unwrap(), out.shared_secret);
}

#[test]
fn test_did_derivation_invariant() {
    let pair = HybridKeyPair::generate().unwrap();
    let fp = pair.to_record().fingerprint();

    assert_eq!(pair.derive_did(), format!("did:qlink:{fp}"));
    // 16 bytes of SHA-256 output, base64url unpadded
    assert_eq!(fp.len(), 22);
    assert!(!fp.contains('='));
    assert!(!fp.contains('+'));
    assert!(!fp.contains('/'));
}

#[test]
fn test_record_json_field_order_is_canonical() {
    let pair = HybridKeyPair::generate().unwrap();
    let json = String::from_utf8(pair.to_record().canonical_json()).unwrap();

    let kty = json.find("\"kty\"").unwrap();
    let alg = json.find("\"alg\"").unwrap();
    let use_ = json.find("\"use\"").unwrap();
    let crv = json.find("\"crv\"").unwrap();
    let x = json.find("\"x\"").unwrap();
    let y = json.find("\"y\"").unwrap();
    let kem = json.find("\"kem\"").unwrap();
    assert!(kty < alg && alg < use_ && use_ < crv && crv < x && x < y && y < kem);
}
