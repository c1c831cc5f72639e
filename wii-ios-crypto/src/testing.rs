//! Fixed key material and helpers for building signed test fixtures.
//!
//! Available to this crate's tests and, through the `test-util` feature, to
//! dependents' tests.

use crate::cert::{SignatureType, set_signature};
use crate::{ec, rsa};

fn decode_hex(parts: &[&str]) -> Vec<u8> {
    let joined: String = parts.concat();
    (0..joined.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&joined[i..i + 2], 16).unwrap_or(0))
        .collect()
}

const ROOT_MODULUS: &[&str] = &[
    "d779b812e7eecc2368b359f6e78f531aaf3cf4274a71edd56e0d2365e158b32124823a7869a463699a2dc327",
    "849a5d1a92b4f9c92608e2debf392c12b0ca481890b91424b03bd6aba9757a2e0215b10164a1d2cd7d69e63d",
    "3ea267036d25d832e8dfc2b9d1661d821cb9574c930332c3587d334cbc2ed4e1ae162105a4256c59cc565baf",
    "1eabf71f29c3cf090ca435f90ca52fe7d515fa917a42be0a635e30434dd35a948b715a2dd5a0f717889eeff4",
    "b00668c9bcf459ef8823c1c738c66421b25d346d1d8a44bb8384eeb8092bcaed79c33d952f6e90762db2b2da",
    "fd06f6b2c958191d3c9b27ca818fbf231a98fb32de21e6c3aad5dc774a1a1a4c2defa1c4fe8c7cad2cded50e",
    "9f32bd8d2f84d9e8549d889ecb363746a4c30a42518421290531a298a7c181faca48f0b43a2c502f4dda1116",
    "418372f37e7a0171bf7ce69c5ea754c11e1522543475068cb2ca2f027f996945c26b0c93643bc54e94e19038",
    "7be3a8677fce0c0137104961443615dc070733d3bce9cd6dfe1a283a2a5930d942549dd62d5572f8371e9710",
    "070c136f5c1fa3003d60e29ca39f33fcbdc53d24ece863631b8f853146a632c468263cb0728ed377984c3657",
    "1b4847307d27e80fd934e813c5a3045f880ed6b6e61d15b428ec8468e8a91fdb84beb7ce065755864384bfdc",
    "f78fc41ad2a6c52f144229aa9dd7a6e08963f41e0cdfcd56ebbca087",
];

const ROOT_PRIVATE: &[&str] = &[
    "000a19aa873857f939afaeb888da51dd9362a378ce5eaef87708b194f73198f6cc96e983d4211f93895fb0c5",
    "7514c2279b174564700958614a0fac9e6441e5397bed4cbfa4f89dd572367f4b3adcde276de949ac97f54901",
    "81dd6dbf6669b75c6b067f76a13f2f8a328f2620f175f2b06e77b766b03221ffd89450753bce75f29e42f5c9",
    "566c19a37bd2795b3b115ca12b0b6cb2d22b2adc93f5272bc150e7195c0e49d9f51c9433a5f25d9937812ff2",
    "0f8630c6b8ae22c614744d38c81de12ed0658bf8e9247956bf736ac7c5d8a834daecda3a08c4306a951f8f40",
    "d30309508710e910444e92f74a86c8362d6f11bcb4a5b4f11c3ae5cb6fcc096d3224f516a00f4994f3fee336",
    "253ee971ee4d4fe60b9971a11b7ba216bb7051092b67ee704d90a74be3e6042af733707eaba80ffe82806afc",
    "bbf54ed89e53c49dad0470b5439b7fda984abb827d99324eae27e1ba38d12ee45ed654cf3ffb5377e1a764ab",
    "a80043fcdf396100dd706f015f9116b5b82dde4f4e797e0d8395b101f1cda4ab9dead54c7da31062f0a1090a",
    "75fc344f119547f72d70da6fceafd1cda8740b4848b583b2e4b48edb5158b240f5c6ab3b99825c4dda76375e",
    "7fbead7760e5b47aec79a5a01888b76c9fefef1592e06a036ef2c715946a04246ca717120bb41394b70af98f",
    "aa8769dd03aa8a1fc9cecdde74d2f575fd63c46c5a9ea97dd203a581",
];

const CA_MODULUS: &[&str] = &[
    "b9de8fe7c5219fcedceacfd7c0df530cb99f4ea083c7aed0d2ce228307cc39951f3ce0a36dd57a1fcb2c4852",
    "c080ae1c9dd3867719e6063e9023a9bdfac5db17b31e0eb69439da0e02a96c5c6a3ff89618b0d49d29f81e98",
    "546e9dfd880e8897af430db4c0d1ea758e04dbf01f9110a36262d8fc8f59182bc1e3629baba09596e5586b00",
    "8b453fb6be3047a110c8d8e1186da48984b8e055bb01c1727acf161ba9a47d65139b0e9878a468ecdf53a84b",
    "60070ab0b69689087c8dc42991161a437d99ff1e21033af29530fd9928ab05f3f3f7cddaa1846d3464e7db82",
    "88b4242804cf2a27383f1bf0679917f61052cef09aeeaf5d06c30c2e877bf6da3ac6590f",
];

const CA_PRIVATE: &[&str] = &[
    "95c7b01789580b3bdbf2ad02a43e52e29242ba4dc764068fe9108be7234583b193b6af1f83c6dfdef70efc49",
    "132f9f1f185ff89fc992ffbd32d24a5af9d6af336df7eecb5aaf33f4ce58512637c8cd3dc72fd865be08603f",
    "48eacb0e1fb1f688a58757682d69fb92379bdad0a9df7094f917c6dbdf78606e02948646040c27fe4dc10055",
    "f06d67869d182d748c0a86a2155fdcb43f127103e78c2858030d185f6843e9f27d11322f0db6d64f40c13861",
    "229c8bfb904547d0412a7abe3dce83dde45996ff219a52bb9b957864603b6a36c0b82bd1f32277314bbc8bdc",
    "a73fe8d220cfd5b72a21fc3e79eb557fb54f07fe631662f2e526e2b8a3dd623c7aa78e21",
];

const ISSUER_MODULUS: &[&str] = &[
    "f9f086871931d892975893243bf119bee8128a891286bf7b29971e1fa18d99f3050b4d33c9b4e4d5fc1d2b4d",
    "eece077e10313273f4d5aed4f41243c6cfe9ff4bfa95b3b0929ceac755d56923c0cbbbc7fab676074893e945",
    "865fa6bf36a5044281262f16750d208e3963dec0601ffb70afe8ddc66a4519ae52b8f60271790deaed5329b1",
    "624c9518a0b050f1204d59ca6fa0508b958e23252ad0a6218c5e994e9cb8cbd836d6e5e4ce2a85bc9e0afe51",
    "0db2a458befbd1b72126ca5ece1e35d31b0a24e0e0803cb824592be2cecfbc634a5e5e2a4172d6d3634dc6f2",
    "1df572f6dd86d65eab3b3b6ad15e7e142901ffc512b7db5397067ce3c9cbc23021639ad5",
];

const ISSUER_PRIVATE: &[&str] = &[
    "d80ff35baa8e0a987eb9154a077f5f3047526fec1ad5dd85cce8542427f64f156450e6c654224a88294fd5f5",
    "a2f0fc4d20164775323bdecd3cc8e54a62c5f7ea688f2d2d0131214c7c88e64100139f1b3b42ac3993a639cb",
    "de63a5b43abae039d5877ac14122bdf7f4e8bed132c7b307312a6f3d6cf49b44b5422b78e53b2ea92871aef6",
    "358c19188674ad8783b1c3d5bb3789488ad25bb9a0e48d364702e1b9474abc642b030984a327b54c87b1b8d1",
    "849195f398d7802fecfb1cfdc66f0757f19d8ae43472e0f0203aa57c0594c13d4aa7eb995bf5ec28e36905d9",
    "323c85e99c18ee4b86a317ef47fb605ecd7afdf90a3f7aaba045c72384268c4baa42d1e9",
];

/// RSA key pair with public exponent 0x10001.
#[derive(Debug, Clone)]
pub struct TestRsaKey {
    pub modulus: Vec<u8>,
    pub private_exponent: Vec<u8>,
}

impl TestRsaKey {
    pub const EXPONENT: u32 = 0x10001;

    /// RSA-4096 key standing in for the console root key.
    pub fn root() -> Self {
        Self::from_parts(ROOT_MODULUS, ROOT_PRIVATE)
    }

    /// RSA-2048 key for a certificate authority.
    pub fn ca() -> Self {
        Self::from_parts(CA_MODULUS, CA_PRIVATE)
    }

    /// RSA-2048 key for a ticket or TMD signer.
    pub fn issuer() -> Self {
        Self::from_parts(ISSUER_MODULUS, ISSUER_PRIVATE)
    }

    fn from_parts(modulus: &[&str], private: &[&str]) -> Self {
        Self {
            modulus: decode_hex(modulus),
            private_exponent: decode_hex(private),
        }
    }

    pub fn sign(&self, digest: &[u8; 20]) -> Vec<u8> {
        rsa::sign_pkcs1v15_sha1(&self.modulus, &self.private_exponent, digest).unwrap_or_default()
    }
}

/// Sign a blob in place with an RSA key, over its issuer-to-end region.
pub fn sign_blob_rsa(blob: &mut [u8], key: &TestRsaKey) -> bool {
    let digest = crate::cert::SignedBlobReader::new(blob.to_vec()).sha1();
    set_signature(blob, &key.sign(&digest))
}

/// Sign a blob in place with an ECC private key.
pub fn sign_blob_ecc(blob: &mut [u8], private_key: &ec::PrivateKey) -> bool {
    let reader = crate::cert::SignedBlobReader::new(blob.to_vec());
    if reader.signature_type() != Some(SignatureType::Ecc) {
        return false;
    }
    set_signature(blob, &ec::sign(private_key, &reader.sha1()))
}
