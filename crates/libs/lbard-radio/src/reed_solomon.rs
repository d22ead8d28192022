//! Reed-Solomon (223,255) systematic FEC: 32 parity bytes
//! appended to every outgoing packet body, Berlekamp-Massey/Chien/Forney
//! decoding on receive, with a stricter acceptance threshold than the code
//! is mathematically capable of correcting.
//!
//! Polynomials throughout are dense, highest-degree-first `Vec<u8>`s.

use thiserror::Error;

use crate::gf256;

pub const CODEWORD_LEN: usize = 255;
pub const PARITY_LEN: usize = 32;
pub const MAX_DATA_LEN: usize = CODEWORD_LEN - PARITY_LEN;
/// Even though 32 parity bytes are mathematically good for up to 16
/// symbol errors, a decode is only accepted below this threshold.
pub const MAX_ACCEPTED_ERRORS: usize = 7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FecError {
    #[error("data too long for one RS codeword: {0} bytes")]
    DataTooLong(usize),
    #[error("too many symbol errors to correct")]
    TooManyErrors,
    #[error("corrected codeword still fails syndrome check")]
    UncorrectableSyndrome,
}

fn poly_eval(p: &[u8], x: u8) -> u8 {
    let mut y = p[0];
    for &c in &p[1..] {
        y = gf256::mul(y, x) ^ c;
    }
    y
}

fn poly_mul(a: &[u8], b: &[u8]) -> Vec<u8> {
    let da = a.len() - 1;
    let db = b.len() - 1;
    let mut out = vec![0u8; da + db + 1];
    for (ia, &ca) in a.iter().enumerate() {
        if ca == 0 {
            continue;
        }
        let pa = da - ia;
        for (ib, &cb) in b.iter().enumerate() {
            if cb == 0 {
                continue;
            }
            let pb = db - ib;
            let idx = (da + db) - (pa + pb);
            out[idx] ^= gf256::mul(ca, cb);
        }
    }
    out
}

fn poly_scale(p: &[u8], x: u8) -> Vec<u8> {
    p.iter().map(|&c| gf256::mul(c, x)).collect()
}

/// Elementwise XOR, zero-extending the shorter polynomial's high-degree end.
fn poly_add(a: &[u8], b: &[u8]) -> Vec<u8> {
    let len = a.len().max(b.len());
    let mut out = vec![0u8; len];
    for (i, &c) in a.iter().rev().enumerate() {
        out[len - 1 - i] ^= c;
    }
    for (i, &c) in b.iter().rev().enumerate() {
        out[len - 1 - i] ^= c;
    }
    out
}

fn generator_poly(nsym: usize) -> Vec<u8> {
    let mut g = vec![1u8];
    for i in 0..nsym {
        g = poly_mul(&g, &[1, gf256::pow(2, i as i32)]);
    }
    g
}

/// Systematic encode: returns `data` followed by `PARITY_LEN` parity bytes.
pub fn encode(data: &[u8]) -> Result<Vec<u8>, FecError> {
    if data.len() > MAX_DATA_LEN {
        return Err(FecError::DataTooLong(data.len()));
    }
    let gen = generator_poly(PARITY_LEN);
    let mut buf = data.to_vec();
    buf.extend(std::iter::repeat(0u8).take(PARITY_LEN));
    for i in 0..data.len() {
        let coef = buf[i];
        if coef != 0 {
            for (j, &gcoef) in gen.iter().enumerate() {
                buf[i + j] ^= gf256::mul(gcoef, coef);
            }
        }
    }
    Ok(buf)
}

fn syndromes(codeword: &[u8], nsym: usize) -> Vec<u8> {
    (0..nsym).map(|i| poly_eval(codeword, gf256::pow(2, i as i32))).collect()
}

fn berlekamp_massey(synd: &[u8]) -> Result<Vec<u8>, FecError> {
    let mut err_loc = vec![1u8];
    let mut old_loc = vec![1u8];
    for i in 0..synd.len() {
        old_loc.push(0);
        let mut delta = synd[i];
        for j in 1..err_loc.len() {
            delta ^= gf256::mul(err_loc[err_loc.len() - 1 - j], synd[i - j]);
        }
        if delta != 0 {
            if old_loc.len() > err_loc.len() {
                let new_loc = poly_scale(&old_loc, delta);
                old_loc = poly_scale(&err_loc, gf256::inv(delta));
                err_loc = new_loc;
            }
            err_loc = poly_add(&err_loc, &poly_scale(&old_loc, delta));
        }
    }
    while err_loc.len() > 1 && err_loc[0] == 0 {
        err_loc.remove(0);
    }
    let errs = err_loc.len() - 1;
    if errs * 2 > synd.len() {
        return Err(FecError::TooManyErrors);
    }
    Ok(err_loc)
}

fn chien_search(err_loc: &[u8], codeword_len: usize) -> Result<Vec<usize>, FecError> {
    let errs = err_loc.len() - 1;
    let mut positions = Vec::new();
    for i in 0..codeword_len {
        if poly_eval(err_loc, gf256::pow(2, i as i32)) == 0 {
            positions.push(codeword_len - 1 - i);
        }
    }
    if positions.len() != errs {
        return Err(FecError::TooManyErrors);
    }
    Ok(positions)
}

fn formal_derivative(p: &[u8]) -> Vec<u8> {
    let degree = p.len() - 1;
    if degree == 0 {
        return vec![0];
    }
    let mut deriv = vec![0u8; degree];
    for (idx, &c) in p.iter().enumerate() {
        let power = degree - idx;
        if power == 0 || power % 2 == 0 {
            continue;
        }
        let new_power = power - 1;
        deriv[degree - 1 - new_power] ^= c;
    }
    deriv
}

fn error_evaluator(synd: &[u8], err_loc: &[u8], nsym: usize) -> Vec<u8> {
    let synd_highfirst: Vec<u8> = synd.iter().rev().copied().collect();
    let raw = poly_mul(&synd_highfirst, err_loc);
    let take = nsym.min(raw.len());
    let mut out = vec![0u8; nsym];
    out[nsym - take..].copy_from_slice(&raw[raw.len() - take..]);
    out
}

fn forney_correct(
    codeword: &[u8],
    err_loc: &[u8],
    err_eval: &[u8],
    positions: &[usize],
) -> Vec<u8> {
    let mut corrected = codeword.to_vec();
    let err_loc_prime = formal_derivative(err_loc);
    for &pos in positions {
        let i = codeword.len() - 1 - pos;
        let x = gf256::pow(2, i as i32);
        let x_inv = gf256::inv(x);
        let numerator = poly_eval(err_eval, x_inv);
        let denominator = poly_eval(&err_loc_prime, x_inv);
        let magnitude = gf256::mul(gf256::mul(numerator, gf256::inv(denominator)), x);
        corrected[pos] ^= magnitude;
    }
    corrected
}

#[derive(Debug, PartialEq, Eq)]
pub struct Decoded {
    pub data: Vec<u8>,
    pub errors_corrected: usize,
}

/// Decodes a full `data_len + PARITY_LEN` codeword, correcting up to
/// [`MAX_ACCEPTED_ERRORS`] symbol errors. Packets needing more correction
/// than that are rejected even though the code could mathematically go
/// further — a deliberately conservative acceptance rule.
pub fn decode(codeword: &[u8]) -> Result<Decoded, FecError> {
    if codeword.len() < PARITY_LEN {
        return Err(FecError::DataTooLong(0));
    }
    let data_len = codeword.len() - PARITY_LEN;
    let synd = syndromes(codeword, PARITY_LEN);
    if synd.iter().all(|&s| s == 0) {
        return Ok(Decoded { data: codeword[..data_len].to_vec(), errors_corrected: 0 });
    }

    let err_loc = berlekamp_massey(&synd)?;
    let errs = err_loc.len() - 1;
    if errs > MAX_ACCEPTED_ERRORS {
        return Err(FecError::TooManyErrors);
    }

    let positions = chien_search(&err_loc, codeword.len())?;
    let err_eval = error_evaluator(&synd, &err_loc, PARITY_LEN);
    let corrected = forney_correct(codeword, &err_loc, &err_eval, &positions);

    if syndromes(&corrected, PARITY_LEN).iter().any(|&s| s != 0) {
        return Err(FecError::UncorrectableSyndrome);
    }

    Ok(Decoded { data: corrected[..data_len].to_vec(), errors_corrected: errs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_codeword_round_trips_with_zero_errors() {
        let data = b"hello mesh network, converge your bundles";
        let codeword = encode(data).unwrap();
        let decoded = decode(&codeword).unwrap();
        assert_eq!(decoded.data, data);
        assert_eq!(decoded.errors_corrected, 0);
    }

    #[test]
    fn single_byte_error_is_corrected() {
        let data = vec![0x42u8; 100];
        let mut codeword = encode(&data).unwrap();
        codeword[10] ^= 0xFF;
        let decoded = decode(&codeword).unwrap();
        assert_eq!(decoded.data, data);
        assert_eq!(decoded.errors_corrected, 1);
    }

    #[test]
    fn several_scattered_errors_within_threshold_are_corrected() {
        let data: Vec<u8> = (0u8..200).collect();
        let mut codeword = encode(&data).unwrap();
        for pos in [0, 50, 120, 180, 230] {
            codeword[pos] ^= 0xAA;
        }
        let decoded = decode(&codeword).unwrap();
        assert_eq!(decoded.data, data);
        assert_eq!(decoded.errors_corrected, 5);
    }

    #[test]
    fn data_over_max_len_is_rejected_at_encode() {
        let data = vec![0u8; MAX_DATA_LEN + 1];
        assert_eq!(encode(&data), Err(FecError::DataTooLong(MAX_DATA_LEN + 1)));
    }
}
