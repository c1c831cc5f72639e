use super::*;
use wii_ios_core::util::{put_u32_be, put_u64_be, write_fixed_ascii};
use wii_ios_crypto::cert::build_certificate;
use wii_ios_crypto::iosc::ConsoleType;
use wii_ios_crypto::testing::{TestRsaKey, sign_blob_rsa};
use wii_ios_crypto::{IoscError, PublicKeyType, SignatureType};

const TICKET_ISSUER: &str = "Root-CA00000001-XS00000003";
const TITLE_ID: u64 = 0x0001_0001_5245_5345;

struct Fixture {
    _dir: tempfile::TempDir,
    iosc: Iosc,
    fs: HostFileSystem,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fs = HostFileSystem::new(dir.path());
        let iosc = Iosc::new(ConsoleType::Retail)
            .with_root_key(&TestRsaKey::root().modulus)
            .unwrap();
        Self {
            _dir: dir,
            iosc,
            fs,
        }
    }

    fn es(&mut self) -> EsCore<'_> {
        EsCore::new(&mut self.iosc, &mut self.fs)
    }
}

fn ca_cert() -> Vec<u8> {
    let mut cert = build_certificate(
        SignatureType::Rsa4096,
        "Root",
        PublicKeyType::Rsa2048,
        "CA00000001",
        0,
        &TestRsaKey::ca().modulus,
        TestRsaKey::EXPONENT,
    )
    .unwrap();
    assert!(sign_blob_rsa(&mut cert, &TestRsaKey::root()));
    cert
}

fn signer_cert(name: &str) -> Vec<u8> {
    let mut cert = build_certificate(
        SignatureType::Rsa2048,
        "Root-CA00000001",
        PublicKeyType::Rsa2048,
        name,
        0,
        &TestRsaKey::issuer().modulus,
        TestRsaKey::EXPONENT,
    )
    .unwrap();
    assert!(sign_blob_rsa(&mut cert, &TestRsaKey::ca()));
    cert
}

fn chain() -> Vec<u8> {
    let mut chain = signer_cert("XS00000003");
    chain.extend(ca_cert());
    chain
}

fn unsigned_ticket(issuer: &str, encrypted_key: [u8; 16], common_key_index: u8) -> Vec<u8> {
    let mut ticket = vec![0u8; TICKET_SIZE];
    put_u32_be(&mut ticket, 0, SignatureType::Rsa2048 as u32);
    write_fixed_ascii(&mut ticket[0x140..0x180], issuer);
    ticket[0x1BF..0x1CF].copy_from_slice(&encrypted_key);
    put_u64_be(&mut ticket, 0x1D0, 0x0002_0000_1234_5678);
    put_u32_be(&mut ticket, 0x1D8, 0x0403_AC68);
    put_u64_be(&mut ticket, 0x1DC, TITLE_ID);
    ticket[0x1F1] = common_key_index;
    ticket
}

fn signed_ticket(issuer: &str) -> Vec<u8> {
    let mut ticket = unsigned_ticket(issuer, [0x11; 16], 0);
    assert!(sign_blob_rsa(&mut ticket, &TestRsaKey::issuer()));
    ticket
}

// ---------------------------------------------------------------------------
// Container verification
// ---------------------------------------------------------------------------

#[test]
fn ticket_signed_by_xs_verifies() {
    let mut fx = Fixture::new();
    let ticket = SignedBlobReader::new(signed_ticket(TICKET_ISSUER));
    let result = fx.es().verify_container(
        VerifyContainerType::Ticket,
        VerifyMode::DoNotUpdateCertStore,
        &ticket,
        &chain(),
    );
    assert!(result.is_ok(), "{result:?}");
}

#[test]
fn verification_releases_its_handles() {
    let mut fx = Fixture::new();
    let ticket = SignedBlobReader::new(signed_ticket(TICKET_ISSUER));
    let chain = chain();
    // More rounds than the key table has user slots.
    for _ in 0..40 {
        fx.es()
            .verify_container(
                VerifyContainerType::Ticket,
                VerifyMode::DoNotUpdateCertStore,
                &ticket,
                &chain,
            )
            .unwrap();
    }
    let mut tampered = signed_ticket(TICKET_ISSUER);
    tampered[0x1DC] ^= 1;
    let tampered = SignedBlobReader::new(tampered);
    for _ in 0..40 {
        assert!(
            fx.es()
                .verify_container(
                    VerifyContainerType::Ticket,
                    VerifyMode::DoNotUpdateCertStore,
                    &tampered,
                    &chain,
                )
                .is_err()
        );
    }
}

#[test]
fn tampered_ticket_fails_signature_check() {
    let mut fx = Fixture::new();
    let mut ticket = signed_ticket(TICKET_ISSUER);
    ticket[0x1F1] ^= 0xFF;
    let err = fx
        .es()
        .verify_container(
            VerifyContainerType::Ticket,
            VerifyMode::DoNotUpdateCertStore,
            &SignedBlobReader::new(ticket),
            &chain(),
        )
        .unwrap_err();
    assert!(matches!(err, EsError::Iosc(IoscError::FailCheckValue)), "{err:?}");
}

#[test]
fn issuer_prefix_must_match_container_type() {
    let mut fx = Fixture::new();
    let ticket = SignedBlobReader::new(signed_ticket(TICKET_ISSUER));
    let err = fx
        .es()
        .verify_container(
            VerifyContainerType::Tmd,
            VerifyMode::DoNotUpdateCertStore,
            &ticket,
            &chain(),
        )
        .unwrap_err();
    assert_eq!(err.code(), wii_ios_core::codes::ES_EINVAL);
}

#[test]
fn issuer_needs_three_components() {
    let mut fx = Fixture::new();
    let ticket = SignedBlobReader::new(signed_ticket("Root-XS00000003"));
    let err = fx
        .es()
        .verify_container(
            VerifyContainerType::Ticket,
            VerifyMode::DoNotUpdateCertStore,
            &ticket,
            &chain(),
        )
        .unwrap_err();
    assert!(matches!(err, EsError::InvalidContainer));
}

#[test]
fn missing_signer_is_unknown_issuer() {
    let mut fx = Fixture::new();
    let ticket = SignedBlobReader::new(signed_ticket(TICKET_ISSUER));
    let err = fx
        .es()
        .verify_container(
            VerifyContainerType::Ticket,
            VerifyMode::DoNotUpdateCertStore,
            &ticket,
            &ca_cert(),
        )
        .unwrap_err();
    assert!(matches!(&err, EsError::UnknownIssuer(name) if name == TICKET_ISSUER));
    assert_eq!(err.code(), wii_ios_core::codes::ES_UNKNOWN_ISSUER);
}

#[test]
fn unsigned_blob_is_invalid() {
    let mut fx = Fixture::new();
    let err = fx
        .es()
        .verify_container(
            VerifyContainerType::Ticket,
            VerifyMode::DoNotUpdateCertStore,
            &SignedBlobReader::new(vec![0u8; 16]),
            &chain(),
        )
        .unwrap_err();
    assert!(matches!(err, EsError::InvalidContainer));
}

// ---------------------------------------------------------------------------
// Certificate store
// ---------------------------------------------------------------------------

#[test]
fn update_mode_appends_each_certificate_once() {
    let mut fx = Fixture::new();
    let ticket = SignedBlobReader::new(signed_ticket(TICKET_ISSUER));
    let chain = chain();
    for _ in 0..2 {
        fx.es()
            .verify_container(
                VerifyContainerType::Ticket,
                VerifyMode::UpdateCertStore,
                &ticket,
                &chain,
            )
            .unwrap();
    }

    let store = fx.es().read_cert_store().unwrap();
    assert_eq!(store.len(), chain.len());
    let names: Vec<String> = parse_cert_chain(&store).into_keys().collect();
    assert_eq!(names, ["CA00000001", "XS00000003"]);

    let metadata = fx.fs.get_metadata(0, 0, CERT_STORE_PATH).unwrap();
    assert_eq!(metadata.modes, CERT_STORE_MODES);
}

#[test]
fn failed_verification_leaves_store_untouched() {
    let mut fx = Fixture::new();
    let mut ticket = signed_ticket(TICKET_ISSUER);
    ticket[0x1DC] ^= 1;
    assert!(
        fx.es()
            .verify_container(
                VerifyContainerType::Ticket,
                VerifyMode::UpdateCertStore,
                &SignedBlobReader::new(ticket),
                &chain(),
            )
            .is_err()
    );
    assert!(matches!(
        fx.es().read_cert_store(),
        Err(EsError::Fs(FsError::NotFound))
    ));
}

#[test]
fn certificate_import_through_verified_signer() {
    let mut fx = Fixture::new();
    // A leaf signed by XS carrying the CA test key as its public key.
    let mut leaf = build_certificate(
        SignatureType::Rsa2048,
        TICKET_ISSUER,
        PublicKeyType::Rsa2048,
        "XS00000004",
        0,
        &TestRsaKey::ca().modulus,
        TestRsaKey::EXPONENT,
    )
    .unwrap();
    assert!(sign_blob_rsa(&mut leaf, &TestRsaKey::issuer()));
    let leaf = CertReader::new(leaf);

    let dest = fx
        .iosc
        .create_object(ObjectType::PublicKey, ObjectSubType::Rsa2048, pid::ES)
        .unwrap();
    fx.es()
        .verify_certificate(
            VerifyContainerType::Ticket,
            VerifyMode::DoNotUpdateCertStore,
            &leaf,
            &chain(),
            dest,
        )
        .unwrap();

    let digest = [0x5Au8; 20];
    let signature = TestRsaKey::ca().sign(&digest);
    fx.iosc
        .verify_public_key_sign(&digest, dest, &signature, pid::ES)
        .unwrap();
}

// ---------------------------------------------------------------------------
// Title keys
// ---------------------------------------------------------------------------

fn wrapped_title_key(iosc: &Iosc, title_key: &[u8; 16]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..8].copy_from_slice(&TITLE_ID.to_be_bytes());
    iosc.encrypt(HANDLE_COMMON_KEY, &mut iv, title_key, pid::ES)
        .unwrap()
        .try_into()
        .unwrap()
}

#[test]
fn ticket_fields_are_read_big_endian() {
    let ticket = TicketReader::new(unsigned_ticket(TICKET_ISSUER, [7; 16], 1));
    assert!(ticket.is_valid());
    assert_eq!(ticket.title_id(), TITLE_ID);
    assert_eq!(ticket.ticket_id(), 0x0002_0000_1234_5678);
    assert_eq!(ticket.device_id(), 0x0403_AC68);
    assert_eq!(ticket.common_key_index(), 1);
    assert_eq!(ticket.encrypted_title_key(), [7; 16]);
    assert_eq!(ticket.blob().issuer(), TICKET_ISSUER);
}

#[test]
fn title_key_unwraps_with_common_key() {
    let mut fx = Fixture::new();
    let title_key = [0x42u8; 16];
    let wrapped = wrapped_title_key(&fx.iosc, &title_key);

    let ticket = TicketReader::new(unsigned_ticket(TICKET_ISSUER, wrapped, 0));
    assert_eq!(fx.es().decrypt_title_key(&ticket).unwrap(), title_key);

    // Out-of-range indices fall back to the standard common key.
    let ticket = TicketReader::new(unsigned_ticket(TICKET_ISSUER, wrapped, 9));
    assert_eq!(fx.es().decrypt_title_key(&ticket).unwrap(), title_key);
}

#[test]
fn imported_title_key_encrypts_like_plain_key() {
    let mut fx = Fixture::new();
    let title_key = [0x24u8; 16];
    let wrapped = wrapped_title_key(&fx.iosc, &title_key);
    let ticket = TicketReader::new(unsigned_ticket(TICKET_ISSUER, wrapped, 0));

    let handle = fx.es().import_title_key(&ticket).unwrap();
    let mut iv_a = [0u8; 16];
    let mut iv_b = [0u8; 16];
    assert_eq!(
        fx.iosc.encrypt(handle, &mut iv_a, &[3; 32], pid::ES).unwrap(),
        wii_ios_crypto::aes::cbc_encrypt(&title_key, &mut iv_b, &[3; 32])
    );
}

#[test]
fn short_ticket_is_rejected() {
    let mut fx = Fixture::new();
    let ticket = TicketReader::new(vec![0u8; 0x100]);
    assert!(matches!(
        fx.es().decrypt_title_key(&ticket),
        Err(EsError::InvalidTicket)
    ));
    assert_eq!(
        fx.es().import_title_key(&ticket).unwrap_err().code(),
        wii_ios_core::codes::ES_INVALID_TICKET
    );
}
