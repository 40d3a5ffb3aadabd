//! The Erlang term algebra.
//!
//! [`Term`] is a closed, tagged union over every term shape this crate needs to move across the
//! wire or match against: integers, floats, atoms, binaries, strings, lists, tuples, the three
//! identifier types, and pattern-only variables. Composite payloads are held behind `Arc` so that
//! cloning a term for pattern matching or message dispatch is cheap; call sites that need to
//! mutate a uniquely-owned composite use `Arc::make_mut`.
use crate::atom::Atom;
use std::sync::Arc;

/// The kind of a [`Term`], used for `WrongKind` errors and `Var` type constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum TermKind {
    Long,
    Double,
    Atom,
    Binary,
    Str,
    List,
    Tuple,
    Pid,
    Port,
    Reference,
    Var,
}

impl std::fmt::Display for TermKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Long => "long",
            Self::Double => "double",
            Self::Atom => "atom",
            Self::Binary => "binary",
            Self::Str => "string",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Pid => "pid",
            Self::Port => "port",
            Self::Reference => "reference",
            Self::Var => "var",
        };
        f.write_str(s)
    }
}

/// A process identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pid {
    pub node: Atom,
    pub id: u32,
    pub serial: u32,
    pub creation: u32,
}

/// A port identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Port {
    pub node: Atom,
    pub id: u64,
    pub creation: u32,
}

/// A reference. `id` holds 1-5 32-bit words, most significant first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub node: Atom,
    pub creation: u32,
    pub id: Vec<u32>,
}

/// A pattern-only variable: a name plus an optional type constraint.
///
/// `Var` only ever appears inside a term used as a pattern; encoding one into ETF is an
/// [`crate::codec::EncodeError::VarInTerm`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Var {
    pub name: String,
    pub kind: Option<TermKind>,
}

impl Var {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
        }
    }

    pub fn typed(name: impl Into<String>, kind: TermKind) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind),
        }
    }

    /// `true` for `_`, the wildcard that matches anything and binds nothing.
    pub fn is_wildcard(&self) -> bool {
        self.name == "_"
    }
}

/// A proper or improper list: a sequence of elements plus an optional non-nil tail.
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    pub elements: Arc<Vec<Term>>,
    pub tail: Option<Arc<Term>>,
}

impl List {
    pub fn nil() -> Self {
        Self {
            elements: Arc::new(Vec::new()),
            tail: None,
        }
    }

    pub fn proper(elements: Vec<Term>) -> Self {
        Self {
            elements: Arc::new(elements),
            tail: None,
        }
    }

    pub fn improper(elements: Vec<Term>, tail: Term) -> Self {
        Self {
            elements: Arc::new(elements),
            tail: Some(Arc::new(tail)),
        }
    }

    pub fn is_proper(&self) -> bool {
        self.tail.is_none()
    }

    pub fn is_nil(&self) -> bool {
        self.elements.is_empty() && self.tail.is_none()
    }
}

/// The Erlang term algebra.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Long(i64),
    Double(f64),
    Atom(Atom),
    Binary(Arc<Vec<u8>>),
    Str(Arc<Vec<u8>>),
    List(List),
    Tuple(Arc<Vec<Term>>),
    Pid(Pid),
    Port(Port),
    Reference(Reference),
    Var(Var),
}

/// Errors raised when a typed accessor is applied to the wrong [`Term`] variant.
#[derive(Debug, thiserror::Error)]
#[error("expected a term of kind {expected}, but got {actual} ({term:?})")]
pub struct WrongKind {
    pub expected: TermKind,
    pub actual: TermKind,
    pub term: Term,
}

impl Term {
    pub fn long(v: i64) -> Self {
        Self::Long(v)
    }

    pub fn double(v: f64) -> Self {
        Self::Double(v)
    }

    pub fn atom(name: impl Into<String>) -> Self {
        Self::Atom(Atom::new(&name.into()))
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Binary(Arc::new(bytes.into()))
    }

    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Str(Arc::new(bytes.into()))
    }

    pub fn nil() -> Self {
        Self::List(List::nil())
    }

    pub fn list(elements: Vec<Term>) -> Self {
        Self::List(List::proper(elements))
    }

    pub fn improper_list(elements: Vec<Term>, tail: Term) -> Self {
        Self::List(List::improper(elements, tail))
    }

    pub fn tuple(elements: Vec<Term>) -> Self {
        Self::Tuple(Arc::new(elements))
    }

    pub fn kind(&self) -> TermKind {
        match self {
            Self::Long(_) => TermKind::Long,
            Self::Double(_) => TermKind::Double,
            Self::Atom(_) => TermKind::Atom,
            Self::Binary(_) => TermKind::Binary,
            Self::Str(_) => TermKind::Str,
            Self::List(_) => TermKind::List,
            Self::Tuple(_) => TermKind::Tuple,
            Self::Pid(_) => TermKind::Pid,
            Self::Port(_) => TermKind::Port,
            Self::Reference(_) => TermKind::Reference,
            Self::Var(_) => TermKind::Var,
        }
    }

    pub(crate) fn wrong_kind(&self, expected: TermKind) -> WrongKind {
        WrongKind {
            expected,
            actual: self.kind(),
            term: self.clone(),
        }
    }

    pub fn as_long(&self) -> Result<i64, WrongKind> {
        match self {
            Self::Long(v) => Ok(*v),
            _ => Err(self.wrong_kind(TermKind::Long)),
        }
    }

    pub fn as_double(&self) -> Result<f64, WrongKind> {
        match self {
            Self::Double(v) => Ok(*v),
            _ => Err(self.wrong_kind(TermKind::Double)),
        }
    }

    pub fn as_atom(&self) -> Result<Atom, WrongKind> {
        match self {
            Self::Atom(a) => Ok(*a),
            _ => Err(self.wrong_kind(TermKind::Atom)),
        }
    }

    pub fn as_binary(&self) -> Result<&[u8], WrongKind> {
        match self {
            Self::Binary(b) => Ok(b),
            _ => Err(self.wrong_kind(TermKind::Binary)),
        }
    }

    pub fn as_list(&self) -> Result<&List, WrongKind> {
        match self {
            Self::List(l) => Ok(l),
            _ => Err(self.wrong_kind(TermKind::List)),
        }
    }

    pub fn as_tuple(&self) -> Result<&[Term], WrongKind> {
        match self {
            Self::Tuple(t) => Ok(t),
            _ => Err(self.wrong_kind(TermKind::Tuple)),
        }
    }

    pub fn as_pid(&self) -> Result<&Pid, WrongKind> {
        match self {
            Self::Pid(p) => Ok(p),
            _ => Err(self.wrong_kind(TermKind::Pid)),
        }
    }

    /// `true` if every element of a proper list is a `Long` in printable-ASCII range (i.e. it
    /// would print as a string literal).
    fn looks_like_printable_string(elements: &[Term]) -> bool {
        !elements.is_empty()
            && elements.iter().all(|t| match t {
                Term::Long(v) => (0x20..0x7f).contains(v) || matches!(v, 9 | 10 | 13),
                _ => false,
            })
    }

    fn fmt_atom(name: &str, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let needs_quote = name.is_empty()
            || !name.chars().next().unwrap().is_ascii_lowercase()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '@');
        if needs_quote {
            write!(f, "'{}'", name.replace('\\', "\\\\").replace('\'', "\\'"))
        } else {
            f.write_str(name)
        }
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long(v) => write!(f, "{v}"),
            Self::Double(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Self::Atom(a) => Self::fmt_atom(&a.name(), f),
            Self::Binary(b) => {
                write!(f, "<<")?;
                for (i, byte) in b.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{byte}")?;
                }
                write!(f, ">>")
            }
            Self::Str(s) => {
                write!(f, "\"")?;
                for &byte in s.iter() {
                    match byte {
                        b'"' => write!(f, "\\\"")?,
                        b'\\' => write!(f, "\\\\")?,
                        _ => write!(f, "{}", byte as char)?,
                    }
                }
                write!(f, "\"")
            }
            Self::List(l) => {
                if l.is_proper() && Self::looks_like_printable_string(&l.elements) {
                    write!(f, "\"")?;
                    for e in l.elements.iter() {
                        if let Term::Long(v) = e {
                            write!(f, "{}", (*v as u8) as char)?;
                        }
                    }
                    return write!(f, "\"");
                }
                write!(f, "[")?;
                for (i, e) in l.elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{e}")?;
                }
                if let Some(tail) = &l.tail {
                    write!(f, "|{tail}")?;
                }
                write!(f, "]")
            }
            Self::Tuple(elements) => {
                write!(f, "{{")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "}}")
            }
            Self::Pid(p) => write!(f, "<{}.{}.{}>", p.node.name(), p.id, p.serial),
            Self::Port(p) => write!(f, "#Port<{}.{}>", p.node.name(), p.id),
            Self::Reference(r) => {
                write!(f, "#Ref<{}", r.node.name())?;
                for word in &r.id {
                    write!(f, ".{word}")?;
                }
                write!(f, ">")
            }
            Self::Var(v) => f.write_str(&v.name),
        }
    }
}

impl From<i64> for Term {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for Term {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<Atom> for Term {
    fn from(v: Atom) -> Self {
        Self::Atom(v)
    }
}

impl From<Pid> for Term {
    fn from(v: Pid) -> Self {
        Self::Pid(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_canonical_erlang_text() {
        let id = Term::long(123);
        let list = Term::list(vec![
            Term::long(4),
            Term::double(2.0),
            Term::string(*b"test"),
            Term::atom("abcd"),
        ]);
        let t = Term::tuple(vec![Term::atom("perc"), id, list]);
        assert_eq!(t.to_string(), "{perc,123,[4,2.0,\"test\",abcd]}");
    }

    #[test]
    fn atoms_are_quoted_when_needed() {
        assert_eq!(Term::atom("ok").to_string(), "ok");
        assert_eq!(Term::atom("Hello").to_string(), "'Hello'");
        assert_eq!(Term::atom("with space").to_string(), "'with space'");
    }

    #[test]
    fn wrong_kind_accessor_fails() {
        let t = Term::long(1);
        assert!(t.as_atom().is_err());
    }
}
