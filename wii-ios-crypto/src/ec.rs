//! ECC over sect233r1, the curve used for Wii device and AP certificates.
//!
//! Field elements live in GF(2^233) with reduction polynomial
//! `x^233 + x^74 + 1`; the curve is `y^2 + xy = x^3 + x^2 + b`. Scalars
//! (private keys, signature halves) are 30-byte big-endian integers reduced
//! modulo the group order `n`. Public keys and signatures are both 60
//! bytes: two 30-byte big-endian values back to back.

use num_bigint::BigUint;
use num_traits::Zero;
use rand::RngCore;

pub const PRIVATE_KEY_SIZE: usize = 30;
pub const PUBLIC_KEY_SIZE: usize = 60;
pub const SIGNATURE_SIZE: usize = 60;

pub type PrivateKey = [u8; PRIVATE_KEY_SIZE];
pub type PublicKey = [u8; PUBLIC_KEY_SIZE];
pub type Signature = [u8; SIGNATURE_SIZE];

const CURVE_B: [u8; 30] = [
    0x00, 0x66, 0x64, 0x7e, 0xde, 0x6c, 0x33, 0x2c, 0x7f, 0x8c, 0x09, 0x23, 0xbb, 0x58, 0x21, 0x3b,
    0x33, 0x3b, 0x20, 0xe9, 0xce, 0x42, 0x81, 0xfe, 0x11, 0x5f, 0x7d, 0x8f, 0x90, 0xad,
];
const GENERATOR_X: [u8; 30] = [
    0x00, 0xfa, 0xc9, 0xdf, 0xcb, 0xac, 0x83, 0x13, 0xbb, 0x21, 0x39, 0xf1, 0xbb, 0x75, 0x5f, 0xef,
    0x65, 0xbc, 0x39, 0x1f, 0x8b, 0x36, 0xf8, 0xf8, 0xeb, 0x73, 0x71, 0xfd, 0x55, 0x8b,
];
const GENERATOR_Y: [u8; 30] = [
    0x01, 0x00, 0x6a, 0x08, 0xa4, 0x19, 0x03, 0x35, 0x06, 0x78, 0xe5, 0x85, 0x28, 0xbe, 0xbf, 0x8a,
    0x0b, 0xef, 0xf8, 0x67, 0xa7, 0xca, 0x36, 0x71, 0x6f, 0x7e, 0x01, 0xf8, 0x10, 0x52,
];
const ORDER: [u8; 30] = [
    0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x13,
    0xe9, 0x74, 0xe7, 0x2f, 0x8a, 0x69, 0x22, 0x03, 0x1d, 0x26, 0x03, 0xcf, 0xe0, 0xd7,
];

// ---------------------------------------------------------------------------
// GF(2^233)
// ---------------------------------------------------------------------------

const FIELD_BITS: usize = 233;
/// Bit 233 lives in limb 3 at bit 41.
const TOP_LIMB_MASK: u64 = (1 << 41) - 1;

/// Polynomial over GF(2), bit `i` of the integer is the coefficient of x^i.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Elt([u64; 4]);

impl Elt {
    const ZERO: Elt = Elt([0; 4]);
    const ONE: Elt = Elt([1, 0, 0, 0]);
    /// x^233 + x^74 + 1
    const MODULUS: Elt = Elt([1, 1 << 10, 0, 1 << 41]);

    fn from_bytes(bytes: &[u8; 30]) -> Elt {
        let mut limbs = [0u64; 4];
        for (i, &b) in bytes.iter().rev().enumerate() {
            let bit = i * 8;
            limbs[bit / 64] |= (b as u64) << (bit % 64);
        }
        limbs[3] &= TOP_LIMB_MASK;
        Elt(limbs)
    }

    fn to_bytes(self) -> [u8; 30] {
        let mut out = [0u8; 30];
        for (i, slot) in out.iter_mut().rev().enumerate() {
            let bit = i * 8;
            *slot = (self.0[bit / 64] >> (bit % 64)) as u8;
        }
        out
    }

    fn is_zero(self) -> bool {
        self == Elt::ZERO
    }

    fn bit(self, i: usize) -> bool {
        (self.0[i / 64] >> (i % 64)) & 1 == 1
    }

    /// Degree of the polynomial, -1 for zero.
    fn degree(self) -> i32 {
        for limb in (0..4).rev() {
            if self.0[limb] != 0 {
                return (limb as i32) * 64 + 63 - self.0[limb].leading_zeros() as i32;
            }
        }
        -1
    }

    fn add(self, other: Elt) -> Elt {
        Elt([
            self.0[0] ^ other.0[0],
            self.0[1] ^ other.0[1],
            self.0[2] ^ other.0[2],
            self.0[3] ^ other.0[3],
        ])
    }

    /// Unreduced left shift within 256 bits.
    fn shl(self, n: usize) -> Elt {
        let words = n / 64;
        let bits = n % 64;
        let mut out = [0u64; 4];
        for i in (words..4).rev() {
            let src = i - words;
            out[i] = self.0[src] << bits;
            if bits != 0 && src > 0 {
                out[i] |= self.0[src - 1] >> (64 - bits);
            }
        }
        Elt(out)
    }

    /// Multiply by x and reduce.
    fn mul_x(self) -> Elt {
        let mut r = self.shl(1);
        if r.bit(FIELD_BITS) {
            r = r.add(Elt::MODULUS);
        }
        r
    }

    fn mul(self, other: Elt) -> Elt {
        let mut acc = Elt::ZERO;
        let mut a = self;
        for i in 0..FIELD_BITS {
            if other.bit(i) {
                acc = acc.add(a);
            }
            a = a.mul_x();
        }
        acc
    }

    fn square(self) -> Elt {
        self.mul(self)
    }

    /// Inverse via the binary-polynomial extended Euclidean algorithm.
    /// Zero has no inverse and maps to zero.
    fn inv(self) -> Elt {
        if self.is_zero() {
            return Elt::ZERO;
        }
        let (mut u, mut v) = (self, Elt::MODULUS);
        let (mut g1, mut g2) = (Elt::ONE, Elt::ZERO);
        while u != Elt::ONE {
            let mut j = u.degree() - v.degree();
            if j < 0 {
                std::mem::swap(&mut u, &mut v);
                std::mem::swap(&mut g1, &mut g2);
                j = -j;
            }
            u = u.add(v.shl(j as usize));
            g1 = g1.add(g2.shl(j as usize));
        }
        g1
    }

    fn div(self, other: Elt) -> Elt {
        self.mul(other.inv())
    }
}

// ---------------------------------------------------------------------------
// Curve points
// ---------------------------------------------------------------------------

/// Affine point; (0, 0) is not on the curve and stands for infinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Point {
    x: Elt,
    y: Elt,
}

impl Point {
    const INFINITY: Point = Point {
        x: Elt::ZERO,
        y: Elt::ZERO,
    };

    fn generator() -> Point {
        Point {
            x: Elt::from_bytes(&GENERATOR_X),
            y: Elt::from_bytes(&GENERATOR_Y),
        }
    }

    fn from_bytes(bytes: &PublicKey) -> Point {
        let (x, y) = bytes.split_at(30);
        let mut xb = [0u8; 30];
        let mut yb = [0u8; 30];
        xb.copy_from_slice(x);
        yb.copy_from_slice(y);
        Point {
            x: Elt::from_bytes(&xb),
            y: Elt::from_bytes(&yb),
        }
    }

    fn to_bytes(self) -> PublicKey {
        let mut out = [0u8; 60];
        out[..30].copy_from_slice(&self.x.to_bytes());
        out[30..].copy_from_slice(&self.y.to_bytes());
        out
    }

    fn is_infinity(self) -> bool {
        self.x.is_zero() && self.y.is_zero()
    }

    fn double(self) -> Point {
        if self.x.is_zero() {
            return Point::INFINITY;
        }
        let lambda = self.x.add(self.y.div(self.x));
        let x3 = lambda.square().add(lambda).add(Elt::ONE);
        let y3 = self.x.square().add(lambda.add(Elt::ONE).mul(x3));
        Point { x: x3, y: y3 }
    }

    fn add(self, other: Point) -> Point {
        if self.is_infinity() {
            return other;
        }
        if other.is_infinity() {
            return self;
        }
        if self.x == other.x {
            return if self.y == other.y {
                self.double()
            } else {
                Point::INFINITY
            };
        }
        let dx = self.x.add(other.x);
        let lambda = self.y.add(other.y).div(dx);
        let x3 = lambda.square().add(lambda).add(dx).add(Elt::ONE);
        let y3 = lambda.mul(self.x.add(x3)).add(x3).add(self.y);
        Point { x: x3, y: y3 }
    }

    /// Double-and-add over the big-endian bits of `scalar`.
    fn mul(self, scalar: &[u8]) -> Point {
        let mut acc = Point::INFINITY;
        for byte in scalar {
            for bit in (0..8).rev() {
                acc = acc.double();
                if (byte >> bit) & 1 == 1 {
                    acc = acc.add(self);
                }
            }
        }
        acc
    }

    fn is_on_curve(self) -> bool {
        let b = Elt::from_bytes(&CURVE_B);
        let lhs = self.y.square().add(self.x.mul(self.y));
        let x2 = self.x.square();
        let rhs = x2.mul(self.x).add(x2).add(b);
        lhs == rhs
    }
}

// ---------------------------------------------------------------------------
// Scalars mod n
// ---------------------------------------------------------------------------

fn order() -> BigUint {
    BigUint::from_bytes_be(&ORDER)
}

fn to_scalar_bytes(value: &BigUint) -> [u8; 30] {
    let raw = value.to_bytes_be();
    let mut out = [0u8; 30];
    let n = raw.len().min(30);
    out[30 - n..].copy_from_slice(&raw[raw.len() - n..]);
    out
}

fn inverse_mod(value: &BigUint, n: &BigUint) -> BigUint {
    // n is prime.
    value.modpow(&(n - 2u32), n)
}

fn random_scalar() -> BigUint {
    let n = order();
    let mut rng = rand::thread_rng();
    loop {
        let mut raw = [0u8; 30];
        rng.fill_bytes(&mut raw);
        raw[0] &= 1;
        let k = BigUint::from_bytes_be(&raw) % &n;
        if !k.is_zero() {
            return k;
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Generate a fresh random private key.
pub fn generate_private_key() -> PrivateKey {
    to_scalar_bytes(&random_scalar())
}

/// Derive the public key `d·G`.
pub fn priv_to_public(private_key: &PrivateKey) -> PublicKey {
    Point::generator().mul(private_key).to_bytes()
}

/// Compute the raw ECDH point `d·Q`; callers hash the X half.
pub fn compute_shared_secret(private_key: &PrivateKey, public_key: &PublicKey) -> PublicKey {
    Point::from_bytes(public_key).mul(private_key).to_bytes()
}

/// True if the 60-byte value encodes a point on the curve.
pub fn is_valid_public_key(public_key: &PublicKey) -> bool {
    let p = Point::from_bytes(public_key);
    !p.is_infinity() && p.is_on_curve()
}

/// ECDSA-sign a SHA-1 digest.
pub fn sign(private_key: &PrivateKey, hash: &[u8; 20]) -> Signature {
    let n = order();
    let e = BigUint::from_bytes_be(hash);
    let d = BigUint::from_bytes_be(private_key) % &n;
    loop {
        let k = random_scalar();
        let kg = Point::generator().mul(&to_scalar_bytes(&k));
        let mut r = BigUint::from_bytes_be(&kg.x.to_bytes());
        if r >= n {
            r -= &n;
        }
        if r.is_zero() {
            continue;
        }
        let s = (inverse_mod(&k, &n) * (&e + &r * &d)) % &n;
        if s.is_zero() {
            continue;
        }
        let mut sig = [0u8; 60];
        sig[..30].copy_from_slice(&to_scalar_bytes(&r));
        sig[30..].copy_from_slice(&to_scalar_bytes(&s));
        return sig;
    }
}

/// Verify an ECDSA signature over a SHA-1 digest.
pub fn verify(public_key: &PublicKey, signature: &Signature, hash: &[u8; 20]) -> bool {
    let n = order();
    let r = BigUint::from_bytes_be(&signature[..30]);
    let s = BigUint::from_bytes_be(&signature[30..]);
    if r.is_zero() || s.is_zero() || r >= n || s >= n {
        return false;
    }
    let e = BigUint::from_bytes_be(hash);
    let s_inv = inverse_mod(&s, &n);
    let w1 = (&e * &s_inv) % &n;
    let w2 = (&r * &s_inv) % &n;

    let p = Point::generator()
        .mul(&to_scalar_bytes(&w1))
        .add(Point::from_bytes(public_key).mul(&to_scalar_bytes(&w2)));
    if p.is_infinity() {
        return false;
    }
    let mut rx = BigUint::from_bytes_be(&p.x.to_bytes());
    if rx >= n {
        rx -= &n;
    }
    rx == r
}

#[cfg(test)]
#[path = "tests/ec_tests.rs"]
mod tests;
