//! Structural pattern matching with variable binding.
//!
//! A pattern is an ordinary [`Term`] that may contain [`crate::term::Var`] leaves. Matching a
//! pattern against a subject produces a [`Varbind`]: each distinct variable name is bound to the
//! subject term standing in its position, with linearity enforced (a repeated variable name must
//! bind to structurally-equal subjects everywhere it appears).
use crate::term::{List, Term, TermKind, Var};
use std::collections::BTreeMap;

/// A mapping from pattern-variable name to the term it was bound to.
///
/// Ordered by name for deterministic iteration/error reporting; lookup is still by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Varbind {
    bindings: BTreeMap<String, Term>,
}

impl Varbind {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, name: &str) -> Option<&Term> {
        self.bindings.get(name)
    }

    pub fn bind(&mut self, name: impl Into<String>, term: Term) {
        self.bindings.insert(name.into(), term);
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merges `other` into `self`. Conflicting bindings for the same name are kept from `self`
    /// without consistency checking; callers that need linearity across the merge should check
    /// beforehand.
    pub fn merge(mut self, other: Varbind) -> Self {
        for (k, v) in other.bindings {
            self.bindings.entry(k).or_insert(v);
        }
        self
    }
}

/// Errors raised by [`subst`].
#[derive(Debug, thiserror::Error)]
#[error("variable '{0}' has no binding")]
pub struct UnboundVariable(pub String);

/// Matches `pattern` against `subject`, extending `binding` in place on success.
///
/// Returns `true` iff the match succeeds; on failure `binding` may have been partially mutated
/// and should be discarded by the caller (the registry always matches with a scratch binding per
/// entry, so this is never observed across entries).
pub fn match_term(pattern: &Term, subject: &Term, binding: &mut Varbind) -> bool {
    if let Term::Var(v) = pattern {
        return match_var(v, subject, binding);
    }
    match (pattern, subject) {
        (Term::Long(a), Term::Long(b)) => a == b,
        (Term::Double(a), Term::Double(b)) => a == b,
        (Term::Atom(a), Term::Atom(b)) => a == b,
        (Term::Binary(a), Term::Binary(b)) => a == b,
        (Term::Str(a), Term::Str(b)) => a == b,
        (Term::Tuple(a), Term::Tuple(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(p, s)| match_term(p, s, binding))
        }
        (Term::List(p), Term::List(s)) => match_list(p, s, binding),
        (Term::Pid(a), Term::Pid(b)) => a == b,
        (Term::Port(a), Term::Port(b)) => a == b,
        (Term::Reference(a), Term::Reference(b)) => a == b,
        _ => false,
    }
}

fn match_var(v: &Var, subject: &Term, binding: &mut Varbind) -> bool {
    if v.is_wildcard() {
        return true;
    }
    if let Some(kind) = v.kind {
        if subject.kind() != kind {
            return false;
        }
    }
    match binding.find(&v.name) {
        Some(existing) => existing == subject,
        None => {
            binding.bind(v.name.clone(), subject.clone());
            true
        }
    }
}

/// Matches a list pattern against a list subject, including the list-tail case `[H1,H2|T]`:
/// when the pattern's tail is a [`Term::Var`], it binds to the remaining proper-list suffix of
/// the subject (which is itself a list term, built fresh from the unconsumed elements plus the
/// subject's own tail).
fn match_list(pattern: &List, subject: &List, binding: &mut Varbind) -> bool {
    if pattern.elements.len() > subject.elements.len() {
        return false;
    }
    for (p, s) in pattern.elements.iter().zip(subject.elements.iter()) {
        if !match_term(p, s, binding) {
            return false;
        }
    }
    let remaining_elements = &subject.elements[pattern.elements.len()..];

    match &pattern.tail {
        None => {
            // Proper-list pattern: subject must have no extra elements and a nil tail too.
            remaining_elements.is_empty() && subject.tail.is_none()
        }
        Some(tail_pat) => {
            let remaining_subject = if remaining_elements.is_empty() {
                subject
                    .tail
                    .as_deref()
                    .cloned()
                    .unwrap_or_else(Term::nil)
            } else {
                Term::List(List {
                    elements: std::sync::Arc::new(remaining_elements.to_vec()),
                    tail: subject.tail.clone(),
                })
            };
            match_term(tail_pat, &remaining_subject, binding)
        }
    }
}

/// Replaces every [`Term::Var`] in `pattern` with its binding from `binding`.
///
/// Fails with [`UnboundVariable`] the first time it encounters a variable absent from `binding`
/// (the wildcard `_` is never bound and always fails here — substitution is only meaningful for
/// named variables).
pub fn subst(pattern: &Term, binding: &Varbind) -> Result<Term, UnboundVariable> {
    match pattern {
        Term::Var(v) => binding
            .find(&v.name)
            .cloned()
            .ok_or_else(|| UnboundVariable(v.name.clone())),
        Term::Tuple(elements) => {
            let substituted = elements
                .iter()
                .map(|e| subst(e, binding))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Term::tuple(substituted))
        }
        Term::List(l) => {
            let elements = l
                .elements
                .iter()
                .map(|e| subst(e, binding))
                .collect::<Result<Vec<_>, _>>()?;
            match &l.tail {
                Some(t) => Ok(Term::improper_list(elements, subst(t, binding)?)),
                None => Ok(Term::list(elements)),
            }
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::TermKind;

    fn tuple(elements: Vec<Term>) -> Term {
        Term::tuple(elements)
    }

    fn var(name: &str) -> Term {
        Term::Var(Var::new(name))
    }

    #[test]
    fn linearity_requires_equal_repeats() {
        let pattern = tuple(vec![var("X"), var("X")]);
        let mut b = Varbind::new();
        assert!(match_term(
            &pattern,
            &tuple(vec![Term::atom("a"), Term::atom("a")]),
            &mut b
        ));
        assert_eq!(b.find("X"), Some(&Term::atom("a")));

        let mut b2 = Varbind::new();
        assert!(!match_term(
            &pattern,
            &tuple(vec![Term::atom("a"), Term::atom("b")]),
            &mut b2
        ));
    }

    #[test]
    fn wildcard_matches_anything_and_binds_nothing() {
        let pattern = tuple(vec![var("_"), var("_")]);
        let mut b = Varbind::new();
        assert!(match_term(
            &pattern,
            &tuple(vec![Term::long(1), Term::atom("x")]),
            &mut b
        ));
        assert!(b.is_empty());
    }

    #[test]
    fn list_tail_variable_binds_remaining_suffix() {
        // [H1, H2 | T] matched against [1, 2, 3, 4] binds H1=1, H2=2, T=[3,4].
        let pattern = Term::improper_list(vec![var("H1"), var("H2")], var("T"));
        let subject = Term::list(vec![
            Term::long(1),
            Term::long(2),
            Term::long(3),
            Term::long(4),
        ]);
        let mut b = Varbind::new();
        assert!(match_term(&pattern, &subject, &mut b));
        assert_eq!(b.find("H1"), Some(&Term::long(1)));
        assert_eq!(b.find("H2"), Some(&Term::long(2)));
        assert_eq!(
            b.find("T"),
            Some(&Term::list(vec![Term::long(3), Term::long(4)]))
        );
    }

    #[test]
    fn list_tail_variable_binds_empty_suffix() {
        let pattern = Term::improper_list(vec![var("H")], var("T"));
        let subject = Term::list(vec![Term::long(1)]);
        let mut b = Varbind::new();
        assert!(match_term(&pattern, &subject, &mut b));
        assert_eq!(b.find("T"), Some(&Term::nil()));
    }

    #[test]
    fn list_tail_variable_binds_improper_subject_tail() {
        let pattern = Term::improper_list(vec![var("H")], var("T"));
        let subject = Term::improper_list(vec![Term::long(1), Term::long(2)], Term::long(3));
        let mut b = Varbind::new();
        assert!(match_term(&pattern, &subject, &mut b));
        assert_eq!(
            b.find("T"),
            Some(&Term::improper_list(vec![Term::long(2)], Term::long(3)))
        );
    }

    #[test]
    fn typed_var_constrains_kind() {
        let pattern = Term::Var(Var::typed("X", TermKind::Atom));
        let mut b = Varbind::new();
        assert!(!match_term(&pattern, &Term::long(1), &mut b));
        assert!(match_term(&pattern, &Term::atom("ok"), &mut b));
    }

    #[test]
    fn substitution_round_trips_through_match() {
        let mut b = Varbind::new();
        b.bind("ID", Term::long(123));
        b.bind(
            "List",
            Term::list(vec![
                Term::long(4),
                Term::double(2.0),
                Term::string(*b"test"),
                Term::atom("abcd"),
            ]),
        );
        let pattern = tuple(vec![Term::atom("perc"), var("ID"), var("List")]);
        let term = subst(&pattern, &b).unwrap();
        assert_eq!(term.to_string(), "{perc,123,[4,2.0,\"test\",abcd]}");

        let mut rebind = Varbind::new();
        assert!(match_term(&pattern, &term, &mut rebind));
        assert_eq!(rebind, b);
    }

    #[test]
    fn subst_fails_on_unbound_variable() {
        let pattern = var("X");
        let b = Varbind::new();
        assert!(matches!(subst(&pattern, &b), Err(UnboundVariable(name)) if name == "X"));
    }

    #[test]
    fn end_to_end_scenario_from_testable_properties() {
        // {test,1,123} and {test,1,234} both match {test,N,A}; {ok,2,3,4} matches {ok,N,B,_};
        // {error,3,not_found} matches {error,N,Reason}; {ok,2} matches none of the three.
        let p_test = tuple(vec![Term::atom("test"), var("N"), var("A")]);
        let p_ok = tuple(vec![Term::atom("ok"), var("N"), var("B"), var("_")]);
        let p_error = tuple(vec![Term::atom("error"), var("N"), var("Reason")]);

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

        let mut counts = [0usize; 3];
        for s in &subjects {
            for (i, p) in [&p_test, &p_ok, &p_error].into_iter().enumerate() {
                let mut b = Varbind::new();
                if match_term(p, s, &mut b) {
                    counts[i] += 1;
                    break;
                }
            }
        }
        assert_eq!(counts, [2, 1, 1]);
    }
}
