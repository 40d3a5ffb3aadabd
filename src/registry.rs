//! Ordered dispatch table of (pattern, callback, opaque) entries.
use crate::pattern::{match_term, Varbind};
use crate::term::Term;

/// A handle returned by [`PatternRegistry::push_back`], usable with [`PatternRegistry::erase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

/// The callback invoked on a successful match.
///
/// Returning `true` means "consumed": dispatch stops after this entry. Returning `false`
/// continues to later entries in insertion order.
pub type Callback<O> = Box<dyn FnMut(&Term, &Varbind, &O) -> bool + Send>;

struct Entry<O> {
    handle: Handle,
    pattern: Term,
    callback: Callback<O>,
    opaque: O,
}

/// An ordered set of pattern/callback/opaque entries, dispatched in insertion order.
pub struct PatternRegistry<O> {
    entries: Vec<Entry<O>>,
    next_handle: u64,
}

impl<O> Default for PatternRegistry<O> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_handle: 0,
        }
    }
}

impl<O> PatternRegistry<O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new entry and returns a handle usable to [`Self::erase`] it later.
    pub fn push_back(&mut self, pattern: Term, callback: Callback<O>, opaque: O) -> Handle {
        let handle = Handle(self.next_handle);
        self.next_handle += 1;
        self.entries.push(Entry {
            handle,
            pattern,
            callback,
            opaque,
        });
        handle
    }

    /// Removes the entry identified by `handle`. Returns `true` if an entry was removed.
    pub fn erase(&mut self, handle: Handle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.handle != handle);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Matches `subject` against every entry in insertion order with a fresh scratch binding per
    /// entry. Invokes the first matching entry's callback; if it returns `false`, matching
    /// continues to later entries. Returns `true` iff some callback consumed the subject.
    pub fn dispatch(&mut self, subject: &Term) -> bool {
        for entry in self.entries.iter_mut() {
            let mut binding = Varbind::new();
            if match_term(&entry.pattern, subject, &mut binding) {
                if (entry.callback)(&entry.pattern, &binding, &entry.opaque) {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Var;
    use std::sync::{Arc, Mutex};

    fn tuple(elements: Vec<Term>) -> Term {
        Term::tuple(elements)
    }

    fn var(name: &str) -> Term {
        Term::Var(Var::new(name))
    }

    #[test]
    fn dispatches_in_insertion_order_and_counts_invocations() {
        let mut registry: PatternRegistry<u32> = PatternRegistry::new();
        let counts = Arc::new(Mutex::new(vec![0usize; 3]));

        let make_cb = |counts: Arc<Mutex<Vec<usize>>>, idx: usize| {
            Box::new(move |_: &Term, _: &Varbind, _: &u32| {
                counts.lock().unwrap()[idx] += 1;
                true
            }) as Callback<u32>
        };

        registry.push_back(
            tuple(vec![Term::atom("test"), var("N"), var("A")]),
            make_cb(counts.clone(), 0),
            1,
        );
        registry.push_back(
            tuple(vec![Term::atom("ok"), var("N"), var("B"), var("_")]),
            make_cb(counts.clone(), 1),
            2,
        );
        registry.push_back(
            tuple(vec![Term::atom("error"), var("N"), var("Reason")]),
            make_cb(counts.clone(), 2),
            3,
        );

        let subjects = vec![
            tuple(vec![Term::atom("test"), Term::long(1), Term::long(123)]),
            tuple(vec![Term::atom("test"), Term::long(1), Term::long(234)]),
            tuple(vec![
                Term::atom("ok"),
                Term::long(2),
                Term::long(3),
                Term::long(4),
            ]),
            tuple(vec![Term::atom("ok"), Term::long(2)]),
            tuple(vec![
                Term::atom("error"),
                Term::long(3),
                Term::atom("not_found"),
            ]),
        ];

        let mut matched_any = 0;
        for s in &subjects {
            if registry.dispatch(s) {
                matched_any += 1;
            }
        }
        assert_eq!(matched_any, 4);
        assert_eq!(*counts.lock().unwrap(), vec![2, 1, 1]);
    }

    #[test]
    fn earlier_entries_shadow_later_ones() {
        let mut registry: PatternRegistry<()> = PatternRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let log1 = log.clone();
        registry.push_back(
            var("X"),
            Box::new(move |_, _, _| {
                log1.lock().unwrap().push(1);
                true
            }),
            (),
        );
        let log2 = log.clone();
        registry.push_back(
            var("Y"),
            Box::new(move |_, _, _| {
                log2.lock().unwrap().push(2);
                true
            }),
            (),
        );

        assert!(registry.dispatch(&Term::long(42)));
        assert_eq!(*log.lock().unwrap(), vec![1]);
    }

    #[test]
    fn erase_removes_an_entry_by_handle() {
        let mut registry: PatternRegistry<()> = PatternRegistry::new();
        let handle = registry.push_back(var("X"), Box::new(|_, _, _| true), ());
        assert_eq!(registry.len(), 1);
        assert!(registry.erase(handle));
        assert_eq!(registry.len(), 0);
        assert!(!registry.dispatch(&Term::long(1)));
    }
}
