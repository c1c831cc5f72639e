use super::*;

const CONSOLE_KEY: PrivateKey = [
    0x00, 0xAB, 0xEE, 0xC1, 0xDD, 0xB4, 0xA6, 0x16, 0x6B, 0x70, 0xFD, 0x7E, 0x56, 0x67, 0x70, 0x57,
    0x55, 0x27, 0x38, 0xA3, 0x26, 0xC5, 0x46, 0x16, 0xF7, 0x62, 0xC9, 0xED, 0x73, 0xF2,
];

fn scalar(value: u8) -> PrivateKey {
    let mut key = [0u8; 30];
    key[29] = value;
    key
}

#[test]
fn generator_is_on_curve() {
    assert!(Point::generator().is_on_curve());
    assert!(is_valid_public_key(&priv_to_public(&scalar(1))));
}

#[test]
fn field_inverse() {
    let g = Point::generator();
    assert_eq!(g.x.mul(g.x.inv()), Elt::ONE);
    assert_eq!(g.y.mul(g.y.inv()), Elt::ONE);
}

#[test]
fn field_bytes_round_trip() {
    assert_eq!(Elt::from_bytes(&GENERATOR_X).to_bytes(), GENERATOR_X);
    assert_eq!(Elt::from_bytes(&GENERATOR_Y).to_bytes(), GENERATOR_Y);
}

#[test]
fn group_order_annihilates_generator() {
    assert!(Point::generator().mul(&ORDER).is_infinity());
}

#[test]
fn scalar_multiplication_is_additive() {
    let g = Point::generator();
    let two_g = g.double();
    assert_eq!(g.mul(&scalar(2)), two_g);
    assert_eq!(g.mul(&scalar(3)), two_g.add(g));
    assert_eq!(g.add(g), two_g);
}

#[test]
fn public_key_of_console_key_is_valid() {
    let public = priv_to_public(&CONSOLE_KEY);
    assert!(is_valid_public_key(&public));
}

#[test]
fn sign_then_verify() {
    let public = priv_to_public(&CONSOLE_KEY);
    let digest = [0x5Au8; 20];
    let sig = sign(&CONSOLE_KEY, &digest);
    assert!(verify(&public, &sig, &digest));
}

#[test]
fn tampered_signature_or_digest_fails() {
    let public = priv_to_public(&CONSOLE_KEY);
    let digest = [0x11u8; 20];
    let sig = sign(&CONSOLE_KEY, &digest);

    let mut bad_digest = digest;
    bad_digest[0] ^= 1;
    assert!(!verify(&public, &sig, &bad_digest));

    let mut bad_sig = sig;
    bad_sig[45] ^= 0x80;
    assert!(!verify(&public, &bad_sig, &digest));

    let other = priv_to_public(&scalar(7));
    assert!(!verify(&other, &sig, &digest));
}

#[test]
fn zero_signature_is_rejected() {
    let public = priv_to_public(&CONSOLE_KEY);
    assert!(!verify(&public, &[0; 60], &[0; 20]));
}

#[test]
fn shared_secret_is_symmetric() {
    let a = generate_private_key();
    let b = generate_private_key();
    let ab = compute_shared_secret(&a, &priv_to_public(&b));
    let ba = compute_shared_secret(&b, &priv_to_public(&a));
    assert_eq!(ab, ba);
}
