use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, LazyLock, Mutex};

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Name(usize);

static NAME_COUNTER: AtomicUsize = AtomicUsize::new(0);
static NAME_TABLE: LazyLock<Mutex<HashMap<String, Name>>> = LazyLock::new(Default::default);
static NAME_REV_TABLE: LazyLock<Mutex<HashMap<Name, String>>> = LazyLock::new(Default::default);

impl Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match NAME_REV_TABLE.lock().unwrap().get(self) {
            Some(nickname) => write!(f, "{}", nickname),
            None => write!(f, "{}", self.0),
        }
    }
}

#[derive(Error, Debug, Clone)]
#[error("invalid name")]
pub struct InvalidNameError;

impl TryFrom<&str> for Name {
    type Error = InvalidNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Name::intern(value)
    }
}

impl Name {
    pub fn intern(value: &str) -> Result<Name, InvalidNameError> {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            regex::Regex::new(r"^[\p{Cased_Letter}_][\p{Cased_Letter}\p{Number}_']*$").unwrap()
        });
        if !RE.is_match(value) {
            return Err(InvalidNameError);
        }
        let mut name_table = NAME_TABLE.lock().unwrap();
        if let Some(&name) = name_table.get(value) {
            return Ok(name);
        }
        let id = NAME_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let name = Name(id);
        name_table.insert(value.to_owned(), name);
        drop(name_table);
        // This can be put here outside the critical section of NAME_TABLE
        // because no one but this function knows of the value of `name`.
        NAME_REV_TABLE
            .lock()
            .unwrap()
            .insert(name, value.to_owned());
        Ok(name)
    }
}

/// Identifies a metavariable or a proof hole. Minted from the counter that
/// the metavariable context carries, so the two families never collide.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Id(usize);

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ty {
    Base(Name),
    Arrow(Arc<TyArrow>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TyArrow {
    pub dom: Ty,
    pub cod: Ty,
}

#[inline]
pub fn mk_ty_base(name: Name) -> Ty {
    Ty::Base(name)
}

#[inline]
pub fn mk_ty_arrow(dom: Ty, cod: Ty) -> Ty {
    Ty::Arrow(Arc::new(TyArrow { dom, cod }))
}

impl Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const TY_PREC_ARROW: u8 = 0;
        const TY_PREC_ATOM: u8 = 1;

        fn fmt_ty(ty: &Ty, f: &mut std::fmt::Formatter<'_>, prec: u8) -> std::fmt::Result {
            match ty {
                Ty::Base(name) => write!(f, "{}", name),
                Ty::Arrow(inner) => {
                    let needs_paren = prec > TY_PREC_ARROW;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    fmt_ty(&inner.dom, f, TY_PREC_ATOM)?;
                    write!(f, " -> ")?;
                    fmt_ty(&inner.cod, f, TY_PREC_ARROW)?;
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
            }
        }

        fmt_ty(self, f, TY_PREC_ARROW)
    }
}

impl Ty {
    pub fn is_base(&self) -> bool {
        matches!(self, Ty::Base(_))
    }
}

/// Terms of the simply-typed lambda calculus. Bound and free variables use
/// separate de Bruijn indices: `Bvar(0)` is bound by the innermost `Lam`,
/// and `Fvar(0)` refers to the innermost enclosing free binder (a `∀` of
/// the rule layer, or the newest entry of a goal's free context).
#[derive(Clone, Debug)]
pub enum Term {
    Bvar(usize),
    Fvar(usize),
    Mvar(Id),
    App(Arc<TermApp>),
    Lam(Arc<TermLam>),
    Const(Name),
}

#[derive(Clone, Debug)]
pub struct TermApp {
    pub fun: Term,
    pub arg: Term,
}

#[derive(Clone, Debug)]
pub struct TermLam {
    // for display only; identity is positional
    pub binder_name: Name,
    pub binder_ty: Ty,
    pub body: Term,
}

#[inline]
pub fn mk_bvar(index: usize) -> Term {
    Term::Bvar(index)
}

#[inline]
pub fn mk_fvar(index: usize) -> Term {
    Term::Fvar(index)
}

#[inline]
pub fn mk_mvar(id: Id) -> Term {
    Term::Mvar(id)
}

#[inline]
pub fn mk_app(fun: Term, arg: Term) -> Term {
    Term::App(Arc::new(TermApp { fun, arg }))
}

#[inline]
pub fn mk_lam(binder_name: Name, binder_ty: Ty, body: Term) -> Term {
    Term::Lam(Arc::new(TermLam {
        binder_name,
        binder_ty,
        body,
    }))
}

#[inline]
pub fn mk_const(name: Name) -> Term {
    Term::Const(name)
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Term::Bvar(i), Term::Bvar(j)) => i == j,
            (Term::Fvar(i), Term::Fvar(j)) => i == j,
            (Term::Mvar(a), Term::Mvar(b)) => a == b,
            (Term::App(a), Term::App(b)) => a.fun == b.fun && a.arg == b.arg,
            // binder names are hints
            (Term::Lam(a), Term::Lam(b)) => a.binder_ty == b.binder_ty && a.body == b.body,
            (Term::Const(a), Term::Const(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Term {}

impl Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const TERM_PREC_LAM: u8 = 0;
        const TERM_PREC_APP: u8 = 1;
        const TERM_PREC_ATOM: u8 = 2;

        fn fmt_term(term: &Term, f: &mut std::fmt::Formatter<'_>, prec: u8) -> std::fmt::Result {
            match term {
                Term::Bvar(index) => write!(f, "#{}", index),
                Term::Fvar(index) => write!(f, "${}", index),
                Term::Mvar(id) => write!(f, "?{}", id),
                Term::App(inner) => {
                    let needs_paren = prec > TERM_PREC_APP;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    fmt_term(&inner.fun, f, TERM_PREC_APP)?;
                    write!(f, " ")?;
                    fmt_term(&inner.arg, f, TERM_PREC_ATOM)?;
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Term::Lam(inner) => {
                    let needs_paren = prec > TERM_PREC_LAM;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    write!(f, "\\{} : {}, ", inner.binder_name, inner.binder_ty)?;
                    fmt_term(&inner.body, f, TERM_PREC_LAM)?;
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Term::Const(name) => write!(f, "{}", name),
            }
        }

        fmt_term(self, f, TERM_PREC_LAM)
    }
}

impl Term {
    /// Adds `n` to every bound index at or above `k`.
    pub fn lift_bound(&self, n: usize, k: usize) -> Term {
        if n == 0 {
            return self.clone();
        }
        match self {
            Term::Bvar(i) if *i >= k => mk_bvar(i + n),
            Term::Bvar(_) | Term::Fvar(_) | Term::Mvar(_) | Term::Const(_) => self.clone(),
            Term::App(inner) => mk_app(
                inner.fun.lift_bound(n, k),
                inner.arg.lift_bound(n, k),
            ),
            Term::Lam(inner) => mk_lam(
                inner.binder_name,
                inner.binder_ty.clone(),
                inner.body.lift_bound(n, k + 1),
            ),
        }
    }

    /// Replaces `Bvar(k)` by `u` (lifted under the binders crossed so far)
    /// and shifts the bound indices above `k` down by one.
    pub fn subst_bound(&self, u: &Term, k: usize) -> Term {
        match self {
            Term::Bvar(i) if *i == k => u.lift_bound(k, 0),
            Term::Bvar(i) if *i > k => mk_bvar(i - 1),
            Term::Bvar(_) | Term::Fvar(_) | Term::Mvar(_) | Term::Const(_) => self.clone(),
            Term::App(inner) => mk_app(
                inner.fun.subst_bound(u, k),
                inner.arg.subst_bound(u, k),
            ),
            Term::Lam(inner) => mk_lam(
                inner.binder_name,
                inner.binder_ty.clone(),
                inner.body.subst_bound(u, k + 1),
            ),
        }
    }

    /// Adds `n` to every free index at or above `k`. Lambdas do not affect
    /// the free depth.
    pub fn lift_free(&self, n: usize, k: usize) -> Term {
        if n == 0 {
            return self.clone();
        }
        match self {
            Term::Fvar(j) if *j >= k => mk_fvar(j + n),
            Term::Bvar(_) | Term::Fvar(_) | Term::Mvar(_) | Term::Const(_) => self.clone(),
            Term::App(inner) => mk_app(inner.fun.lift_free(n, k), inner.arg.lift_free(n, k)),
            Term::Lam(inner) => mk_lam(
                inner.binder_name,
                inner.binder_ty.clone(),
                inner.body.lift_free(n, k),
            ),
        }
    }

    /// Replaces `Fvar(k)` by `u` and shifts the free indices above `k` down
    /// by one. `u` must not contain loose bound variables; elaborated
    /// top-level terms never do.
    pub fn subst_free(&self, u: &Term, k: usize) -> Term {
        match self {
            Term::Fvar(j) if *j == k => u.clone(),
            Term::Fvar(j) if *j > k => mk_fvar(j - 1),
            Term::Bvar(_) | Term::Fvar(_) | Term::Mvar(_) | Term::Const(_) => self.clone(),
            Term::App(inner) => mk_app(inner.fun.subst_free(u, k), inner.arg.subst_free(u, k)),
            Term::Lam(inner) => mk_lam(
                inner.binder_name,
                inner.binder_ty.clone(),
                inner.body.subst_free(u, k),
            ),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid variable index #{index}")]
    InvalidIndex { index: usize },
    #[error("unknown const: `{name}`")]
    UnknownConst { name: Name },
    #[error("unknown metavariable ?{id}")]
    UnknownMeta { id: Id },
    #[error("function type expected, got {ty}")]
    ArrowExpected { ty: Ty },
    #[error("type mismatch in application: expected {expected}, got {got}")]
    AppMismatch { expected: Ty, got: Ty },
}

/// The metavariable context: assignments and types for minted
/// metavariables, plus the shared fresh counter for metavariables and
/// proof holes. Assignments are never overwritten.
#[derive(Debug, Clone, Default)]
pub struct MetaCtx {
    assignments: HashMap<Id, Term>,
    types: HashMap<Id, Ty>,
    counter: usize,
}

impl MetaCtx {
    pub fn fresh_id(&mut self) -> Id {
        let id = Id(self.counter);
        self.counter += 1;
        id
    }

    pub fn fresh_mvar(&mut self, ty: Ty) -> Term {
        let id = self.fresh_id();
        self.types.insert(id, ty);
        mk_mvar(id)
    }

    pub fn get(&self, id: Id) -> Option<&Term> {
        self.assignments.get(&id)
    }

    pub fn type_of(&self, id: Id) -> Option<&Ty> {
        self.types.get(&id)
    }

    pub fn assign(&mut self, id: Id, m: Term) {
        let previous = self.assignments.insert(id, m);
        debug_assert!(previous.is_none(), "metavariable ?{} reassigned", id);
    }

    /// Does `id` occur in `m`, following assignments transitively?
    pub fn occurs(&self, m: &Term, id: Id) -> bool {
        match m {
            Term::Mvar(other) => {
                *other == id
                    || self
                        .get(*other)
                        .is_some_and(|value| self.occurs(value, id))
            }
            Term::App(inner) => self.occurs(&inner.fun, id) || self.occurs(&inner.arg, id),
            Term::Lam(inner) => self.occurs(&inner.body, id),
            Term::Bvar(_) | Term::Fvar(_) | Term::Const(_) => false,
        }
    }

    /// Replaces assigned metavariables by their values, transitively.
    /// Cycles are impossible thanks to the occurs check at assignment.
    pub fn instantiate(&self, m: &Term) -> Term {
        match m {
            Term::Mvar(id) => match self.get(*id) {
                Some(value) => self.instantiate(value),
                None => m.clone(),
            },
            Term::App(inner) => mk_app(
                self.instantiate(&inner.fun),
                self.instantiate(&inner.arg),
            ),
            Term::Lam(inner) => mk_lam(
                inner.binder_name,
                inner.binder_ty.clone(),
                self.instantiate(&inner.body),
            ),
            Term::Bvar(_) | Term::Fvar(_) | Term::Const(_) => m.clone(),
        }
    }

    /// Weak-head normal form: beta-reduction at the head plus resolution of
    /// assigned metavariables. No eta, no delta.
    pub fn whnf(&self, m: &Term) -> Term {
        match m {
            Term::App(inner) => {
                let fun = self.whnf(&inner.fun);
                if let Term::Lam(lam) = &fun {
                    self.whnf(&lam.body.subst_bound(&inner.arg, 0))
                } else {
                    mk_app(fun, inner.arg.clone())
                }
            }
            Term::Mvar(id) => match self.get(*id) {
                Some(value) => self.whnf(value),
                None => m.clone(),
            },
            Term::Bvar(_) | Term::Fvar(_) | Term::Lam(_) | Term::Const(_) => m.clone(),
        }
    }

    pub(crate) fn def_eq_core(&mut self, m1: &Term, m2: &Term) -> bool {
        let m1 = self.whnf(m1);
        let m2 = self.whnf(m2);
        match (&m1, &m2) {
            (Term::Mvar(a), Term::Mvar(b)) if a == b => true,
            (Term::Mvar(id), other) | (other, Term::Mvar(id)) => {
                if self.occurs(other, *id) {
                    return false;
                }
                self.assign(*id, other.clone());
                true
            }
            (Term::Bvar(i), Term::Bvar(j)) => i == j,
            (Term::Fvar(i), Term::Fvar(j)) => i == j,
            (Term::Const(a), Term::Const(b)) => a == b,
            (Term::Lam(a), Term::Lam(b)) => {
                a.binder_ty == b.binder_ty && self.def_eq_core(&a.body, &b.body)
            }
            (Term::App(a), Term::App(b)) => {
                self.def_eq_core(&a.fun, &b.fun) && self.def_eq_core(&a.arg, &b.arg)
            }
            _ => false,
        }
    }

    /// Definitional equality up to beta and metavariable assignment. On
    /// success the recorded assignments are kept; on failure the context is
    /// left exactly as it was.
    pub fn is_def_eq(&mut self, m1: &Term, m2: &Term) -> bool {
        let mut trial = self.clone();
        if trial.def_eq_core(m1, m2) {
            *self = trial;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Env<'a> {
    pub consts: &'a HashMap<Name, Ty>,
}

impl Env<'_> {
    pub fn infer_type(
        &self,
        mctx: &MetaCtx,
        fctx: &[(Name, Ty)],
        bctx: &mut Vec<Ty>,
        m: &Term,
    ) -> Result<Ty, TypeError> {
        match m {
            Term::Bvar(index) => bctx
                .get(bctx.len().wrapping_sub(index + 1))
                .cloned()
                .ok_or(TypeError::InvalidIndex { index: *index }),
            Term::Fvar(index) => fctx
                .get(fctx.len().wrapping_sub(index + 1))
                .map(|(_, ty)| ty.clone())
                .ok_or(TypeError::InvalidIndex { index: *index }),
            Term::Mvar(id) => mctx
                .type_of(*id)
                .cloned()
                .ok_or(TypeError::UnknownMeta { id: *id }),
            Term::App(inner) => {
                let fun_ty = self.infer_type(mctx, fctx, bctx, &inner.fun)?;
                let Ty::Arrow(arrow) = fun_ty else {
                    return Err(TypeError::ArrowExpected { ty: fun_ty });
                };
                let arg_ty = self.infer_type(mctx, fctx, bctx, &inner.arg)?;
                if arrow.dom != arg_ty {
                    return Err(TypeError::AppMismatch {
                        expected: arrow.dom.clone(),
                        got: arg_ty,
                    });
                }
                Ok(arrow.cod.clone())
            }
            Term::Lam(inner) => {
                bctx.push(inner.binder_ty.clone());
                let body_ty = self.infer_type(mctx, fctx, bctx, &inner.body);
                bctx.pop();
                Ok(mk_ty_arrow(inner.binder_ty.clone(), body_ty?))
            }
            Term::Const(name) => self
                .consts
                .get(name)
                .cloned()
                .ok_or(TypeError::UnknownConst { name: *name }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn name(value: &str) -> Name {
        Name::intern(value).unwrap()
    }

    fn base(value: &str) -> Ty {
        mk_ty_base(name(value))
    }

    #[test]
    fn ty_display_parenthesizes_left_arrows() {
        let t = mk_ty_arrow(mk_ty_arrow(base("a"), base("b")), base("c"));
        insta::assert_snapshot!(t.to_string(), @"(a -> b) -> c");
        let u = mk_ty_arrow(base("a"), mk_ty_arrow(base("b"), base("c")));
        insta::assert_snapshot!(u.to_string(), @"a -> b -> c");
    }

    #[test]
    fn term_display_uses_surface_syntax() {
        let m = mk_lam(
            name("x"),
            base("T"),
            mk_app(mk_app(mk_const(name("P")), mk_bvar(0)), mk_fvar(1)),
        );
        insta::assert_snapshot!(m.to_string(), @r"\x : T, P #0 $1");
    }

    #[test]
    fn beta_step_reduces_at_the_head() {
        let mctx = MetaCtx::default();
        // (\x : T, x) c
        let m = mk_app(
            mk_lam(name("x"), base("T"), mk_bvar(0)),
            mk_const(name("c")),
        );
        assert_eq!(mctx.whnf(&m), mk_const(name("c")));
    }

    #[test]
    fn whnf_keeps_the_original_argument() {
        let mctx = MetaCtx::default();
        let redex = mk_app(
            mk_lam(name("x"), base("T"), mk_bvar(0)),
            mk_const(name("c")),
        );
        let m = mk_app(mk_const(name("f")), redex.clone());
        // the head is not a lambda, so the argument stays unreduced
        assert_eq!(mctx.whnf(&m), m);
    }

    #[test]
    fn whnf_resolves_assigned_metavariables() {
        let mut mctx = MetaCtx::default();
        let mv = mctx.fresh_mvar(base("T"));
        let Term::Mvar(id) = mv else { unreachable!() };
        mctx.assign(id, mk_const(name("c")));
        assert_eq!(mctx.whnf(&mk_mvar(id)), mk_const(name("c")));
    }

    #[test]
    fn occurs_follows_assignments() {
        let mut mctx = MetaCtx::default();
        let a = mctx.fresh_id();
        let b = mctx.fresh_id();
        mctx.assign(a, mk_app(mk_const(name("f")), mk_mvar(b)));
        assert!(mctx.occurs(&mk_mvar(a), b));
        assert!(!mctx.occurs(&mk_const(name("f")), b));
    }

    #[test]
    fn def_eq_assigns_one_sided_metavariables() {
        let mut mctx = MetaCtx::default();
        let mv = mctx.fresh_mvar(base("T"));
        assert!(mctx.is_def_eq(&mv, &mk_fvar(0)));
        assert_eq!(mctx.instantiate(&mv), mk_fvar(0));
    }

    #[test]
    fn def_eq_failure_leaves_the_context_untouched() {
        let mut mctx = MetaCtx::default();
        let mv = mctx.fresh_mvar(base("T"));
        let Term::Mvar(id) = mv else { unreachable!() };
        // ?0 =?= f ?0 fails the occurs check
        let lhs = mk_app(mk_const(name("f")), mk_mvar(id));
        assert!(!mctx.is_def_eq(&mk_mvar(id), &lhs));
        assert!(mctx.get(id).is_none());
        // and a failing pair rolls back the partial assignment
        let pair1 = mk_app(mk_mvar(id), mk_const(name("c")));
        let pair2 = mk_app(mk_const(name("g")), mk_const(name("d")));
        assert!(!mctx.is_def_eq(&pair1, &pair2));
        assert!(mctx.get(id).is_none());
    }

    #[test]
    fn infer_type_of_application() {
        let mut consts = HashMap::new();
        consts.insert(name("P"), mk_ty_arrow(base("T"), base("Prop")));
        consts.insert(name("c"), base("T"));
        let env = Env { consts: &consts };
        let mctx = MetaCtx::default();
        let m = mk_app(mk_const(name("P")), mk_const(name("c")));
        assert_eq!(
            env.infer_type(&mctx, &[], &mut vec![], &m).unwrap(),
            base("Prop")
        );
        let bad = mk_app(mk_const(name("P")), mk_const(name("P")));
        assert!(matches!(
            env.infer_type(&mctx, &[], &mut vec![], &bad),
            Err(TypeError::AppMismatch { .. })
        ));
    }

    #[test]
    fn unknown_const_error_mentions_the_name() {
        let consts = HashMap::new();
        let env = Env { consts: &consts };
        let mctx = MetaCtx::default();
        let err = env
            .infer_type(&mctx, &[], &mut vec![], &mk_const(name("Q")))
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown const: `Q`");
    }

    #[test]
    fn infer_type_of_lambda() {
        let consts = HashMap::new();
        let env = Env { consts: &consts };
        let mctx = MetaCtx::default();
        let m = mk_lam(name("x"), base("T"), mk_bvar(0));
        assert_eq!(
            env.infer_type(&mctx, &[], &mut vec![], &m).unwrap(),
            mk_ty_arrow(base("T"), base("T"))
        );
    }

    fn arb_term() -> impl Strategy<Value = Term> {
        let leaf = prop_oneof![
            (0usize..4).prop_map(mk_bvar),
            (0usize..4).prop_map(mk_fvar),
            Just(mk_const(name("c"))),
            Just(mk_const(name("d"))),
        ];
        leaf.prop_recursive(4, 24, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(fun, arg)| mk_app(fun, arg)),
                inner.prop_map(|body| mk_lam(name("x"), mk_ty_base(name("T")), body)),
            ]
        })
    }

    // Lambdas with leaf bodies only: every beta step strictly shrinks the
    // term, so whnf terminates even though the terms are untyped.
    fn arb_beta_term() -> impl Strategy<Value = Term> {
        let leaf = prop_oneof![
            (0usize..4).prop_map(mk_bvar),
            (0usize..4).prop_map(mk_fvar),
            Just(mk_const(name("c"))),
        ];
        let shallow = prop_oneof![
            leaf.clone(),
            leaf.prop_map(|body| mk_lam(name("x"), mk_ty_base(name("T")), body)),
        ];
        shallow.prop_recursive(3, 16, 2, |inner| {
            (inner.clone(), inner).prop_map(|(fun, arg)| mk_app(fun, arg))
        })
    }

    proptest! {
        #[test]
        fn lift_bound_by_zero_is_identity(m in arb_term(), k in 0usize..3) {
            prop_assert_eq!(m.lift_bound(0, k), m);
        }

        #[test]
        fn lift_bound_composes(m in arb_term(), a in 0usize..3, b in 0usize..3, k in 0usize..3) {
            prop_assert_eq!(m.lift_bound(a, k).lift_bound(b, k), m.lift_bound(a + b, k));
        }

        #[test]
        fn subst_bound_undoes_lift_bound(m in arb_term(), u in arb_term(), k in 0usize..3) {
            prop_assert_eq!(m.lift_bound(1, k).subst_bound(&u, k), m);
        }

        #[test]
        fn lift_free_by_zero_is_identity(m in arb_term(), k in 0usize..3) {
            prop_assert_eq!(m.lift_free(0, k), m);
        }

        #[test]
        fn lift_free_composes(m in arb_term(), a in 0usize..3, b in 0usize..3, k in 0usize..3) {
            prop_assert_eq!(m.lift_free(a, k).lift_free(b, k), m.lift_free(a + b, k));
        }

        #[test]
        fn subst_free_undoes_lift_free(m in arb_term(), u in arb_term(), k in 0usize..3) {
            prop_assert_eq!(m.lift_free(1, k).subst_free(&u, k), m);
        }

        #[test]
        fn whnf_is_idempotent(m in arb_beta_term()) {
            let mctx = MetaCtx::default();
            let once = mctx.whnf(&m);
            prop_assert_eq!(mctx.whnf(&once), once);
        }

        #[test]
        fn whnf_of_redex_is_whnf_of_substitution(body in arb_beta_term(), arg in arb_beta_term()) {
            let mctx = MetaCtx::default();
            let redex = mk_app(mk_lam(name("x"), mk_ty_base(name("T")), body.clone()), arg.clone());
            prop_assert_eq!(mctx.whnf(&redex), mctx.whnf(&body.subst_bound(&arg, 0)));
        }

        #[test]
        fn def_eq_is_reflexive(m in arb_beta_term()) {
            let mut mctx = MetaCtx::default();
            prop_assert!(mctx.is_def_eq(&m, &m.clone()));
        }
    }
}
