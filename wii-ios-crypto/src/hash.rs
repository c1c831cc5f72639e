use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};

pub type Sha1Digest = [u8; 20];

pub fn sha1(data: &[u8]) -> Sha1Digest {
    Sha1::digest(data).into()
}

pub fn hmac_sha1(key: &[u8], data: &[u8]) -> Sha1Digest {
    // HMAC accepts keys of any length.
    let mut mac = match <Hmac<Sha1> as Mac>::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return [0; 20],
    };
    mac.update(data);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wii_ios_core::util::to_hex;

    #[test]
    fn sha1_known_value() {
        assert_eq!(
            to_hex(&sha1(b"abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn hmac_sha1_rfc2202_case_2() {
        assert_eq!(
            to_hex(&hmac_sha1(b"Jefe", b"what do ya want for nothing?")),
            "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79"
        );
    }
}
