//! Process-wide atom table.
//!
//! Atoms are interned strings identified by a small integer index. Equality between atoms is
//! index equality, which keeps term comparison and pattern matching cheap regardless of how long
//! the underlying name is.
use std::sync::{Mutex, OnceLock};

/// Historical limit on the number of atoms a BEAM node can hold.
pub const MAX_ATOM_COUNT: usize = 1 << 20;

/// Errors produced while interning atoms.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AtomError {
    /// The atom table has reached [`MAX_ATOM_COUNT`] entries.
    #[error("atom table is full (max {MAX_ATOM_COUNT} atoms)")]
    AtomTableFull,

    /// The atom name is longer than the wire format allows.
    #[error("atom name length must be less than 256, but got {size} characters")]
    TooLongName { size: usize },
}

/// A handle to an interned string.
///
/// Cloning an [`Atom`] is a cheap integer copy; equality is index equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Atom(u32);

impl Atom {
    /// Interns `name`, returning a handle usable for O(1) equality checks.
    pub fn new(name: &str) -> Self {
        table().intern(name).expect("atom table exhausted")
    }

    /// Interns `name`, returning [`AtomError`] instead of panicking on overflow.
    pub fn try_new(name: &str) -> Result<Self, AtomError> {
        table().intern(name)
    }

    /// Returns the interned string this atom refers to.
    pub fn name(&self) -> String {
        table().name_of(*self)
    }

    /// The raw table index, useful for the `SMALL_ATOM_EXT`/`ATOM_EXT` wire encodings.
    pub fn index(&self) -> u32 {
        self.0
    }

    /// The wildcard pattern atom `_`.
    pub fn wildcard() -> Self {
        table().wildcard
    }

    /// `true`.
    pub fn atom_true() -> Self {
        table().atom_true
    }

    /// `false`.
    pub fn atom_false() -> Self {
        table().atom_false
    }

    /// `undefined`.
    pub fn undefined() -> Self {
        table().undefined
    }
}

impl std::fmt::Display for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

impl From<&str> for Atom {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Atom {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}

struct Table {
    wildcard: Atom,
    atom_true: Atom,
    atom_false: Atom,
    undefined: Atom,
    inner: Mutex<TableInner>,
}

#[derive(Default)]
struct TableInner {
    names: Vec<String>,
    by_name: std::collections::HashMap<String, u32>,
}

impl TableInner {
    fn intern(&mut self, name: &str) -> Result<Atom, AtomError> {
        if name.len() > 255 {
            return Err(AtomError::TooLongName { size: name.len() });
        }
        if let Some(&idx) = self.by_name.get(name) {
            return Ok(Atom(idx));
        }
        if self.names.len() >= MAX_ATOM_COUNT {
            return Err(AtomError::AtomTableFull);
        }
        let idx = self.names.len() as u32;
        self.names.push(name.to_owned());
        self.by_name.insert(name.to_owned(), idx);
        Ok(Atom(idx))
    }

    fn name_of(&self, atom: Atom) -> String {
        self.names
            .get(atom.0 as usize)
            .cloned()
            .expect("atom index out of range")
    }
}

fn table() -> &'static Table {
    static TABLE: OnceLock<Table> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut inner = TableInner::default();
        let wildcard = inner.intern("_").expect("preintern wildcard");
        let atom_true = inner.intern("true").expect("preintern true");
        let atom_false = inner.intern("false").expect("preintern false");
        let undefined = inner.intern("undefined").expect("preintern undefined");
        Table {
            wildcard,
            atom_true,
            atom_false,
            undefined,
            inner: Mutex::new(inner),
        }
    })
}

impl Table {
    fn intern(&self, name: &str) -> Result<Atom, AtomError> {
        self.inner.lock().unwrap().intern(name)
    }

    fn name_of(&self, atom: Atom) -> String {
        self.inner.lock().unwrap().name_of(atom)
    }

    #[cfg(test)]
    fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = TableInner::default();
        let wildcard = inner.intern("_").expect("preintern wildcard");
        let atom_true = inner.intern("true").expect("preintern true");
        let atom_false = inner.intern("false").expect("preintern false");
        let undefined = inner.intern("undefined").expect("preintern undefined");
        debug_assert_eq!(wildcard, self.wildcard);
        debug_assert_eq!(atom_true, self.atom_true);
        debug_assert_eq!(atom_false, self.atom_false);
        debug_assert_eq!(undefined, self.undefined);
    }
}

/// Resets the global atom table to just its preinterned atoms, discarding every atom interned
/// since. Test-only: lets a test that asserts on exact atom indices start from a known table
/// state instead of whatever earlier tests happened to intern first.
#[cfg(test)]
pub(crate) fn reset() {
    table().reset();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let a = Atom::new("foo_bar_baz_atom");
        let b = Atom::new("foo_bar_baz_atom");
        assert_eq!(a, b);
        assert_eq!(a.name(), "foo_bar_baz_atom");
    }

    #[test]
    fn well_known_atoms_are_preinterned() {
        assert_eq!(Atom::wildcard().name(), "_");
        assert_eq!(Atom::atom_true().name(), "true");
        assert_eq!(Atom::atom_false().name(), "false");
        assert_eq!(Atom::undefined().name(), "undefined");
    }

    #[test]
    fn distinct_names_get_distinct_atoms() {
        let a = Atom::new("distinct_atom_one");
        let b = Atom::new("distinct_atom_two");
        assert_ne!(a, b);
    }

    #[test]
    fn reset_restores_a_known_table_state_for_index_assertions() {
        reset();
        let first = Atom::new("reset_test_first_atom");
        let second = Atom::new("reset_test_second_atom");
        assert_eq!(first.index(), 4);
        assert_eq!(second.index(), 5);

        reset();
        let first_again = Atom::new("reset_test_first_atom");
        assert_eq!(first_again.index(), 4);
        assert_eq!(Atom::wildcard().index(), 0);
        assert_eq!(Atom::atom_true().index(), 1);
        assert_eq!(Atom::atom_false().index(), 2);
        assert_eq!(Atom::undefined().index(), 3);
    }

    #[test]
    fn too_long_name_is_rejected() {
        let name: String = std::iter::repeat('a').take(300).collect();
        assert!(matches!(
            Atom::try_new(&name),
            Err(AtomError::TooLongName { .. })
        ));
    }
}
