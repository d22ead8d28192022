//! GF(2⁸) arithmetic over the CCITT/QR primitive polynomial 0x11D, the
//! field the Reed-Solomon codec runs over.

use std::sync::OnceLock;

struct Tables {
    exp: [u8; 512],
    log: [u8; 256],
}

impl Tables {
    fn build() -> Self {
        let mut exp = [0u8; 512];
        let mut log = [0u8; 256];
        let mut x: u16 = 1;
        for i in 0..255usize {
            exp[i] = x as u8;
            log[x as usize] = i as u8;
            x <<= 1;
            if x & 0x100 != 0 {
                x ^= 0x11D;
            }
        }
        for i in 255..512 {
            exp[i] = exp[i - 255];
        }
        Self { exp, log }
    }
}

static TABLES: OnceLock<Tables> = OnceLock::new();

fn tables() -> &'static Tables {
    TABLES.get_or_init(Tables::build)
}

pub fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = tables();
    t.exp[t.log[a as usize] as usize + t.log[b as usize] as usize]
}

pub fn pow(base: u8, exponent: i32) -> u8 {
    if base == 0 {
        return if exponent == 0 { 1 } else { 0 };
    }
    let t = tables();
    let e = (t.log[base as usize] as i32 * exponent).rem_euclid(255);
    t.exp[e as usize]
}

pub fn inv(a: u8) -> u8 {
    assert!(a != 0, "no inverse for zero in GF(256)");
    let t = tables();
    t.exp[(255 - t.log[a as usize] as i32) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplicative_identity() {
        for a in 1u8..=255 {
            assert_eq!(mul(a, 1), a);
        }
    }

    #[test]
    fn inverse_round_trips() {
        for a in 1u8..=255 {
            assert_eq!(mul(a, inv(a)), 1);
        }
    }

    #[test]
    fn zero_absorbs() {
        assert_eq!(mul(0, 200), 0);
        assert_eq!(mul(200, 0), 0);
    }

    #[test]
    fn pow_matches_repeated_mul() {
        let mut expected = 1u8;
        for i in 0..8 {
            assert_eq!(pow(3, i), expected);
            expected = mul(expected, 3);
        }
    }
}
