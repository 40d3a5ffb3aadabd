//! The Erlang External Term Format (ETF) codec.
//!
//! Encoding always uses the most compact tag a value fits: `SMALL_INTEGER_EXT` over
//! `INTEGER_EXT`, `SMALL_TUPLE_EXT` over `LARGE_TUPLE_EXT`, `STRING_EXT` for byte lists up to
//! 65535 elements. Decoding accepts every tag a real BEAM peer may emit, including the ones this
//! codec never writes itself (e.g. `SMALL_ATOM_EXT` is written, `ATOM_EXT` is only read).
use crate::atom::Atom;
use crate::term::{List, Pid, Port, Reference, Term};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Read;

/// The version magic byte that begins every top-level ETF payload.
pub const VERSION_MAGIC: u8 = 131;

/// Precedes the control tuple and, when present, the payload term in a distribution frame.
pub const PASS_THROUGH: u8 = 112;

const SMALL_INTEGER_EXT: u8 = 97;
const INTEGER_EXT: u8 = 98;
const FLOAT_EXT: u8 = 99;
const ATOM_EXT: u8 = 100;
const SMALL_ATOM_EXT: u8 = 115;
const ATOM_UTF8_EXT: u8 = 118;
const SMALL_ATOM_UTF8_EXT: u8 = 119;
const REFERENCE_EXT: u8 = 101;
const PORT_EXT: u8 = 102;
const PID_EXT: u8 = 103;
const SMALL_TUPLE_EXT: u8 = 104;
const LARGE_TUPLE_EXT: u8 = 105;
const NIL_EXT: u8 = 106;
const STRING_EXT: u8 = 107;
const LIST_EXT: u8 = 108;
const BINARY_EXT: u8 = 109;
const SMALL_BIG_EXT: u8 = 110;
const LARGE_BIG_EXT: u8 = 111;
const NEW_FLOAT_EXT: u8 = 70;
const NEW_REFERENCE_EXT: u8 = 114;
const NEWER_REFERENCE_EXT: u8 = 90;
const NEW_PID_EXT: u8 = 88;
const NEW_PORT_EXT: u8 = 89;

/// Errors raised while decoding a byte span as a term.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("at offset {offset}: {msg}")]
    Malformed { offset: usize, msg: String },
    #[error("at offset {offset}: unexpected end of input")]
    Truncated { offset: usize },
}

impl DecodeError {
    fn malformed(offset: usize, msg: impl Into<String>) -> Self {
        Self::Malformed {
            offset,
            msg: msg.into(),
        }
    }
}

/// Errors raised while encoding a term.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// A [`crate::term::Term::Var`] cannot be serialised; it only exists inside patterns.
    #[error("cannot encode a pattern variable into ETF")]
    VarInTerm,
    /// A string/binary/list exceeded the 32-bit length field of its tag.
    #[error("{what} of length {len} exceeds the maximum encodable length")]
    TooLong { what: &'static str, len: usize },
}

/// Encodes `term` as a standalone ETF payload, i.e. [`VERSION_MAGIC`] followed by the tagged
/// value.
pub fn encode(term: &Term) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(encode_size(term)?);
    out.push(VERSION_MAGIC);
    encode_term(term, &mut out)?;
    Ok(out)
}

/// Decodes a standalone ETF payload (version magic plus one term), failing if trailing bytes
/// remain.
pub fn decode(bytes: &[u8]) -> Result<Term, DecodeError> {
    let (term, rest) = decode_prefixed(bytes)?;
    if !rest.is_empty() {
        return Err(DecodeError::malformed(
            bytes.len() - rest.len(),
            "trailing bytes after term",
        ));
    }
    Ok(term)
}

/// Decodes a standalone ETF payload and returns the unconsumed remainder of `bytes`.
pub fn decode_prefixed(bytes: &[u8]) -> Result<(Term, &[u8]), DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Truncated { offset: 0 });
    }
    if bytes[0] != VERSION_MAGIC {
        return Err(DecodeError::malformed(
            0,
            format!("expected version magic {VERSION_MAGIC}, got {}", bytes[0]),
        ));
    }
    decode_term(&bytes[1..], 1)
}

/// The exact number of bytes `encode(term)` would produce, including the leading version magic.
pub fn encode_size(term: &Term) -> Result<usize, EncodeError> {
    Ok(1 + term_size(term)?)
}

fn term_size(term: &Term) -> Result<usize, EncodeError> {
    Ok(match term {
        Term::Long(v) => {
            if (0..=255).contains(v) {
                2
            } else if i32::try_from(*v).is_ok() {
                5
            } else {
                // SMALL_BIG_EXT: tag + len byte + sign byte + up to 8 digit bytes.
                11
            }
        }
        Term::Double(_) => 9,
        Term::Atom(a) => 2 + a.name().len(),
        Term::Binary(b) => 5 + b.len(),
        Term::Str(s) => {
            if s.len() <= 65535 {
                3 + s.len()
            } else {
                return Err(EncodeError::TooLong {
                    what: "string",
                    len: s.len(),
                });
            }
        }
        Term::List(l) => {
            if l.is_nil() {
                1
            } else {
                let mut size = 5;
                for e in l.elements.iter() {
                    size += term_size(e)?;
                }
                size += match &l.tail {
                    Some(t) => term_size(t)?,
                    None => 1,
                };
                size
            }
        }
        Term::Tuple(elements) => {
            let mut size = if elements.len() <= 255 { 2 } else { 5 };
            for e in elements.iter() {
                size += term_size(e)?;
            }
            size
        }
        Term::Pid(p) => 1 + term_size(&Term::Atom(p.node))? + 4 + 4 + 4,
        Term::Port(p) => 1 + term_size(&Term::Atom(p.node))? + 8 + 4,
        Term::Reference(r) => 1 + term_size(&Term::Atom(r.node))? + 2 + 4 + r.id.len() * 4,
        Term::Var(_) => return Err(EncodeError::VarInTerm),
    })
}

fn encode_term(term: &Term, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    match term {
        Term::Long(v) => encode_long(*v, out),
        Term::Double(v) => {
            out.push(NEW_FLOAT_EXT);
            out.write_f64::<BigEndian>(*v).expect("vec write");
        }
        Term::Atom(a) => encode_atom(*a, out),
        Term::Binary(b) => {
            if b.len() > u32::MAX as usize {
                return Err(EncodeError::TooLong {
                    what: "binary",
                    len: b.len(),
                });
            }
            out.push(BINARY_EXT);
            out.write_u32::<BigEndian>(b.len() as u32).expect("vec write");
            out.extend_from_slice(b);
        }
        Term::Str(s) => {
            if s.len() > 65535 {
                return Err(EncodeError::TooLong {
                    what: "string",
                    len: s.len(),
                });
            }
            out.push(STRING_EXT);
            out.write_u16::<BigEndian>(s.len() as u16).expect("vec write");
            out.extend_from_slice(s);
        }
        Term::List(l) => encode_list(l, out)?,
        Term::Tuple(elements) => encode_tuple(elements, out)?,
        Term::Pid(p) => encode_pid(p, out)?,
        Term::Port(p) => encode_port(p, out)?,
        Term::Reference(r) => encode_reference(r, out)?,
        Term::Var(_) => return Err(EncodeError::VarInTerm),
    }
    Ok(())
}

fn encode_long(v: i64, out: &mut Vec<u8>) {
    if (0..=255).contains(&v) {
        out.push(SMALL_INTEGER_EXT);
        out.push(v as u8);
    } else if let Ok(v32) = i32::try_from(v) {
        out.push(INTEGER_EXT);
        out.write_i32::<BigEndian>(v32).expect("vec write");
    } else {
        out.push(SMALL_BIG_EXT);
        let sign = if v < 0 { 1u8 } else { 0u8 };
        let mut mag = v.unsigned_abs();
        let mut digits = Vec::new();
        while mag > 0 {
            digits.push((mag & 0xff) as u8);
            mag >>= 8;
        }
        out.push(digits.len() as u8);
        out.push(sign);
        out.extend_from_slice(&digits);
    }
}

fn encode_atom(a: Atom, out: &mut Vec<u8>) {
    let name = a.name();
    if name.len() <= 255 {
        out.push(SMALL_ATOM_UTF8_EXT);
        out.push(name.len() as u8);
    } else {
        out.push(ATOM_UTF8_EXT);
        out.write_u16::<BigEndian>(name.len() as u16).expect("vec write");
    }
    out.extend_from_slice(name.as_bytes());
}

fn encode_list(l: &List, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    if l.is_nil() {
        out.push(NIL_EXT);
        return Ok(());
    }
    if l.elements.len() > u32::MAX as usize {
        return Err(EncodeError::TooLong {
            what: "list",
            len: l.elements.len(),
        });
    }
    out.push(LIST_EXT);
    out.write_u32::<BigEndian>(l.elements.len() as u32).expect("vec write");
    for e in l.elements.iter() {
        encode_term(e, out)?;
    }
    match &l.tail {
        Some(t) => encode_term(t, out)?,
        None => out.push(NIL_EXT),
    }
    Ok(())
}

fn encode_tuple(elements: &[Term], out: &mut Vec<u8>) -> Result<(), EncodeError> {
    if elements.len() <= 255 {
        out.push(SMALL_TUPLE_EXT);
        out.push(elements.len() as u8);
    } else {
        out.push(LARGE_TUPLE_EXT);
        out.write_u32::<BigEndian>(elements.len() as u32).expect("vec write");
    }
    for e in elements {
        encode_term(e, out)?;
    }
    Ok(())
}

fn encode_pid(p: &Pid, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    out.push(NEW_PID_EXT);
    encode_atom(p.node, out);
    out.write_u32::<BigEndian>(p.id).expect("vec write");
    out.write_u32::<BigEndian>(p.serial).expect("vec write");
    out.write_u32::<BigEndian>(p.creation).expect("vec write");
    Ok(())
}

fn encode_port(p: &Port, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    out.push(NEW_PORT_EXT);
    encode_atom(p.node, out);
    out.write_u64::<BigEndian>(p.id).expect("vec write");
    out.write_u32::<BigEndian>(p.creation).expect("vec write");
    Ok(())
}

fn encode_reference(r: &Reference, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    out.push(NEWER_REFERENCE_EXT);
    out.write_u16::<BigEndian>(r.id.len() as u16).expect("vec write");
    encode_atom(r.node, out);
    out.write_u32::<BigEndian>(r.creation).expect("vec write");
    for word in &r.id {
        out.write_u32::<BigEndian>(*word).expect("vec write");
    }
    Ok(())
}

fn decode_term(bytes: &[u8], offset: usize) -> Result<(Term, &[u8]), DecodeError> {
    let tag = *bytes
        .first()
        .ok_or(DecodeError::Truncated { offset })?;
    let rest = &bytes[1..];
    match tag {
        SMALL_INTEGER_EXT => {
            let (v, rest) = take(rest, 1, offset + 1)?;
            Ok((Term::Long(v[0] as i64), rest))
        }
        INTEGER_EXT => {
            let (v, rest) = take(rest, 4, offset + 1)?;
            let mut cur = v;
            let n = cur.read_i32::<BigEndian>().expect("len checked");
            Ok((Term::Long(n as i64), rest))
        }
        FLOAT_EXT => {
            let (v, rest) = take(rest, 31, offset + 1)?;
            let s = std::str::from_utf8(&v[..v.iter().position(|&b| b == 0).unwrap_or(v.len())])
                .map_err(|_| DecodeError::malformed(offset, "FLOAT_EXT is not utf8"))?;
            let f: f64 = s
                .trim()
                .parse()
                .map_err(|_| DecodeError::malformed(offset, "FLOAT_EXT is not a float"))?;
            Ok((Term::Double(f), rest))
        }
        NEW_FLOAT_EXT => {
            let (v, rest) = take(rest, 8, offset + 1)?;
            let mut cur = v;
            let f = cur.read_f64::<BigEndian>().expect("len checked");
            Ok((Term::Double(f), rest))
        }
        ATOM_EXT | ATOM_UTF8_EXT => {
            let (len_bytes, rest) = take(rest, 2, offset + 1)?;
            let mut cur = len_bytes;
            let len = cur.read_u16::<BigEndian>().expect("len checked") as usize;
            let (name_bytes, rest) = take(rest, len, offset + 3)?;
            decode_atom_name(name_bytes, offset, rest)
        }
        SMALL_ATOM_EXT | SMALL_ATOM_UTF8_EXT => {
            let (len_byte, rest) = take(rest, 1, offset + 1)?;
            let len = len_byte[0] as usize;
            let (name_bytes, rest) = take(rest, len, offset + 2)?;
            decode_atom_name(name_bytes, offset, rest)
        }
        REFERENCE_EXT => {
            let (node, rest) = decode_term(rest, offset + 1)?;
            let node = atom_of(node, offset)?;
            let (id_bytes, rest) = take(rest, 4, offset)?;
            let mut cur = id_bytes;
            let id = cur.read_u32::<BigEndian>().expect("len checked");
            let (creation_byte, rest) = take(rest, 1, offset)?;
            Ok((
                Term::Reference(Reference {
                    node,
                    creation: creation_byte[0] as u32,
                    id: vec![id],
                }),
                rest,
            ))
        }
        NEW_REFERENCE_EXT | NEWER_REFERENCE_EXT => {
            let (len_bytes, rest) = take(rest, 2, offset + 1)?;
            let mut cur = len_bytes;
            let len = cur.read_u16::<BigEndian>().expect("len checked") as usize;
            let (node, rest) = decode_term(rest, offset)?;
            let node = atom_of(node, offset)?;
            let creation_len = if tag == NEWER_REFERENCE_EXT { 4 } else { 1 };
            let (creation_bytes, rest) = take(rest, creation_len, offset)?;
            let creation = if creation_len == 4 {
                let mut cur = creation_bytes;
                cur.read_u32::<BigEndian>().expect("len checked")
            } else {
                creation_bytes[0] as u32
            };
            let (id_bytes, rest) = take(rest, len * 4, offset)?;
            let mut cur = id_bytes;
            let mut id = Vec::with_capacity(len);
            for _ in 0..len {
                id.push(cur.read_u32::<BigEndian>().expect("len checked"));
            }
            Ok((Term::Reference(Reference { node, creation, id }), rest))
        }
        PORT_EXT | NEW_PORT_EXT => {
            let (node, rest) = decode_term(rest, offset + 1)?;
            let node = atom_of(node, offset)?;
            let (id_bytes, rest) = take(rest, 4, offset)?;
            let mut cur = id_bytes;
            let id = cur.read_u32::<BigEndian>().expect("len checked") as u64;
            let (creation_bytes, rest) = take(rest, 4, offset)?;
            let mut cur = creation_bytes;
            let creation = cur.read_u32::<BigEndian>().expect("len checked");
            Ok((Term::Port(Port { node, id, creation }), rest))
        }
        PID_EXT | NEW_PID_EXT => {
            let (node, rest) = decode_term(rest, offset + 1)?;
            let node = atom_of(node, offset)?;
            let (fields, rest) = take(rest, 12, offset)?;
            let mut cur = fields;
            let id = cur.read_u32::<BigEndian>().expect("len checked");
            let serial = cur.read_u32::<BigEndian>().expect("len checked");
            let creation = cur.read_u32::<BigEndian>().expect("len checked");
            Ok((
                Term::Pid(Pid {
                    node,
                    id,
                    serial,
                    creation,
                }),
                rest,
            ))
        }
        SMALL_TUPLE_EXT => {
            let (len_byte, rest) = take(rest, 1, offset + 1)?;
            decode_tuple_elements(len_byte[0] as usize, rest, offset + 2)
        }
        LARGE_TUPLE_EXT => {
            let (len_bytes, rest) = take(rest, 4, offset + 1)?;
            let mut cur = len_bytes;
            let len = cur.read_u32::<BigEndian>().expect("len checked") as usize;
            decode_tuple_elements(len, rest, offset + 5)
        }
        NIL_EXT => Ok((Term::nil(), rest)),
        STRING_EXT => {
            let (len_bytes, rest) = take(rest, 2, offset + 1)?;
            let mut cur = len_bytes;
            let len = cur.read_u16::<BigEndian>().expect("len checked") as usize;
            let (data, rest) = take(rest, len, offset + 3)?;
            Ok((Term::string(data.to_vec()), rest))
        }
        LIST_EXT => {
            let (len_bytes, rest) = take(rest, 4, offset + 1)?;
            let mut cur = len_bytes;
            let len = cur.read_u32::<BigEndian>().expect("len checked") as usize;
            let mut elements = Vec::with_capacity(len);
            let mut rest = rest;
            let mut cursor = offset + 5;
            for _ in 0..len {
                let (e, r) = decode_term(rest, cursor)?;
                cursor += rest.len() - r.len();
                rest = r;
                elements.push(e);
            }
            let (tail, rest) = decode_term(rest, cursor)?;
            if tail.as_list().map(|l| l.is_nil()).unwrap_or(false) {
                Ok((Term::list(elements), rest))
            } else {
                Ok((Term::improper_list(elements, tail), rest))
            }
        }
        BINARY_EXT => {
            let (len_bytes, rest) = take(rest, 4, offset + 1)?;
            let mut cur = len_bytes;
            let len = cur.read_u32::<BigEndian>().expect("len checked") as usize;
            let (data, rest) = take(rest, len, offset + 5)?;
            Ok((Term::binary(data.to_vec()), rest))
        }
        SMALL_BIG_EXT | LARGE_BIG_EXT => {
            let (len, rest) = if tag == SMALL_BIG_EXT {
                let (b, rest) = take(rest, 1, offset + 1)?;
                (b[0] as usize, rest)
            } else {
                let (b, rest) = take(rest, 4, offset + 1)?;
                let mut cur = b;
                (cur.read_u32::<BigEndian>().expect("len checked") as usize, rest)
            };
            let (sign_byte, rest) = take(rest, 1, offset)?;
            let (digits, rest) = take(rest, len, offset)?;
            if len > 8 {
                return Err(DecodeError::malformed(
                    offset,
                    "bignum does not fit in 64 bits",
                ));
            }
            let mut mag: i64 = 0;
            for &d in digits.iter().rev() {
                mag = (mag << 8) | d as i64;
            }
            let v = if sign_byte[0] != 0 { -mag } else { mag };
            Ok((Term::Long(v), rest))
        }
        other => Err(DecodeError::malformed(offset, format!("unknown tag {other}"))),
    }
}

fn decode_atom_name(name_bytes: &[u8], offset: usize, rest: &[u8]) -> Result<(Term, &[u8]), DecodeError> {
    let name = std::str::from_utf8(name_bytes)
        .map_err(|_| DecodeError::malformed(offset, "atom name is not utf8"))?;
    let atom = Atom::try_new(name)
        .map_err(|e| DecodeError::malformed(offset, e.to_string()))?;
    Ok((Term::Atom(atom), rest))
}

fn decode_tuple_elements(len: usize, rest: &[u8], offset: usize) -> Result<(Term, &[u8]), DecodeError> {
    let mut elements = Vec::with_capacity(len);
    let mut rest = rest;
    let mut cursor = offset;
    for _ in 0..len {
        let (e, r) = decode_term(rest, cursor)?;
        cursor += rest.len() - r.len();
        rest = r;
        elements.push(e);
    }
    Ok((Term::tuple(elements), rest))
}

fn atom_of(term: Term, offset: usize) -> Result<Atom, DecodeError> {
    term.as_atom()
        .map_err(|_| DecodeError::malformed(offset, "expected an atom"))
}

fn take(bytes: &[u8], n: usize, offset: usize) -> Result<(&[u8], &[u8]), DecodeError> {
    if bytes.len() < n {
        return Err(DecodeError::Truncated { offset });
    }
    Ok(bytes.split_at(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn true_atom_encodes_to_the_spec_example_bytes() {
        let bytes = encode(&Term::atom("true")).unwrap();
        assert_eq!(bytes, vec![131, 119, 4, b't', b'r', b'u', b'e']);
    }

    #[test]
    fn ok_one_tuple_uses_compact_tags() {
        let t = Term::tuple(vec![Term::atom("ok"), Term::long(1)]);
        let bytes = encode(&t).unwrap();
        assert_eq!(bytes[1], SMALL_TUPLE_EXT);
        assert_eq!(bytes[2], 2);
        assert_eq!(&bytes[3..6], &[SMALL_ATOM_UTF8_EXT, 2]);
        assert_eq!(&bytes[8..], &[SMALL_INTEGER_EXT, 1]);
    }

    #[test]
    fn round_trips_a_nested_term() {
        let t = Term::tuple(vec![
            Term::atom("perc"),
            Term::long(123),
            Term::list(vec![
                Term::long(4),
                Term::double(2.0),
                Term::string(*b"test"),
                Term::atom("abcd"),
            ]),
        ]);
        let bytes = encode(&t).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, t);
        assert_eq!(bytes.len(), encode_size(&t).unwrap());
    }

    #[test]
    fn round_trips_negative_and_large_integers() {
        for v in [0_i64, -1, 255, 256, -256, i32::MAX as i64 + 1, i64::MIN] {
            let bytes = encode(&Term::long(v)).unwrap();
            assert_eq!(decode(&bytes).unwrap(), Term::Long(v));
        }
    }

    #[test]
    fn round_trips_improper_list() {
        let t = Term::improper_list(vec![Term::long(1), Term::long(2)], Term::long(3));
        let bytes = encode(&t).unwrap();
        assert_eq!(decode(&bytes).unwrap(), t);
    }

    #[test]
    fn rejects_bad_version_magic() {
        let err = decode(&[0, 0, 0]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { offset: 0, .. }));
    }

    #[test]
    fn var_cannot_be_encoded() {
        let v = Term::Var(crate::term::Var::new("X"));
        assert!(matches!(encode(&v), Err(EncodeError::VarInTerm)));
    }
}
