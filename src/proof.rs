//! The proposition layer and proof checking.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::tt::{self, Id, MetaCtx, Name, Term, Ty, TypeError};

/// Rules are the judgements of the logic: `⊢ p` for a term of base type,
/// implication between rules, and universal quantification over a simple
/// type. A `∀` binds `Fvar(0)` of its body.
#[derive(Clone, Debug)]
pub enum Rule {
    Proves(Arc<RuleProves>),
    Implies(Arc<RuleImplies>),
    All(Arc<RuleAll>),
}

#[derive(Clone, Debug)]
pub struct RuleProves {
    pub target: Term,
}

#[derive(Clone, Debug)]
pub struct RuleImplies {
    pub lhs: Rule,
    pub rhs: Rule,
}

#[derive(Clone, Debug)]
pub struct RuleAll {
    // for display only; identity is positional
    pub binder_name: Name,
    pub binder_ty: Ty,
    pub body: Rule,
}

#[inline]
pub fn mk_rule_proves(target: Term) -> Rule {
    Rule::Proves(Arc::new(RuleProves { target }))
}

#[inline]
pub fn mk_rule_implies(lhs: Rule, rhs: Rule) -> Rule {
    Rule::Implies(Arc::new(RuleImplies { lhs, rhs }))
}

#[inline]
pub fn mk_rule_all(binder_name: Name, binder_ty: Ty, body: Rule) -> Rule {
    Rule::All(Arc::new(RuleAll {
        binder_name,
        binder_ty,
        body,
    }))
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Rule::Proves(a), Rule::Proves(b)) => a.target == b.target,
            (Rule::Implies(a), Rule::Implies(b)) => a.lhs == b.lhs && a.rhs == b.rhs,
            (Rule::All(a), Rule::All(b)) => a.binder_ty == b.binder_ty && a.body == b.body,
            _ => false,
        }
    }
}

impl Eq for Rule {}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const RULE_PREC_ALL: u8 = 0;
        const RULE_PREC_IMP: u8 = 1;
        const RULE_PREC_ATOM: u8 = 2;

        fn fmt_rule(rule: &Rule, f: &mut std::fmt::Formatter<'_>, prec: u8) -> std::fmt::Result {
            match rule {
                Rule::Proves(inner) => write!(f, "{}", inner.target),
                Rule::Implies(inner) => {
                    let needs_paren = prec > RULE_PREC_IMP;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    fmt_rule(&inner.lhs, f, RULE_PREC_ATOM)?;
                    write!(f, " => ")?;
                    fmt_rule(&inner.rhs, f, RULE_PREC_IMP)?;
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Rule::All(inner) => {
                    let needs_paren = prec > RULE_PREC_ALL;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    write!(f, "!! {} : {}, ", inner.binder_name, inner.binder_ty)?;
                    fmt_rule(&inner.body, f, RULE_PREC_ALL)?;
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
            }
        }

        fmt_rule(self, f, RULE_PREC_ALL)
    }
}

impl Rule {
    pub fn lift_free(&self, n: usize, k: usize) -> Rule {
        if n == 0 {
            return self.clone();
        }
        match self {
            Rule::Proves(inner) => mk_rule_proves(inner.target.lift_free(n, k)),
            Rule::Implies(inner) => {
                mk_rule_implies(inner.lhs.lift_free(n, k), inner.rhs.lift_free(n, k))
            }
            Rule::All(inner) => mk_rule_all(
                inner.binder_name,
                inner.binder_ty.clone(),
                inner.body.lift_free(n, k + 1),
            ),
        }
    }

    /// Replaces `Fvar(k)` by `u`, pushing through `∀` by incrementing `k`
    /// and lifting `u`, and shifts the free indices above `k` down by one.
    pub fn subst_free(&self, u: &Term, k: usize) -> Rule {
        match self {
            Rule::Proves(inner) => mk_rule_proves(inner.target.subst_free(u, k)),
            Rule::Implies(inner) => {
                mk_rule_implies(inner.lhs.subst_free(u, k), inner.rhs.subst_free(u, k))
            }
            Rule::All(inner) => mk_rule_all(
                inner.binder_name,
                inner.binder_ty.clone(),
                inner.body.subst_free(&u.lift_free(1, 0), k + 1),
            ),
        }
    }

    pub fn inst_meta(&self, mctx: &MetaCtx) -> Rule {
        match self {
            Rule::Proves(inner) => mk_rule_proves(mctx.instantiate(&inner.target)),
            Rule::Implies(inner) => {
                mk_rule_implies(inner.lhs.inst_meta(mctx), inner.rhs.inst_meta(mctx))
            }
            Rule::All(inner) => mk_rule_all(
                inner.binder_name,
                inner.binder_ty.clone(),
                inner.body.inst_meta(mctx),
            ),
        }
    }

    pub fn is_wf(
        &self,
        env: tt::Env,
        mctx: &MetaCtx,
        fctx: &mut Vec<(Name, Ty)>,
    ) -> Result<(), ProofError> {
        match self {
            Rule::Proves(inner) => {
                let ty = env.infer_type(mctx, fctx, &mut vec![], &inner.target)?;
                if !ty.is_base() {
                    return Err(ProofError::PropExpected { ty });
                }
                Ok(())
            }
            Rule::Implies(inner) => {
                inner.lhs.is_wf(env, mctx, fctx)?;
                inner.rhs.is_wf(env, mctx, fctx)
            }
            Rule::All(inner) => {
                fctx.push((inner.binder_name, inner.binder_ty.clone()));
                let result = inner.body.is_wf(env, mctx, fctx);
                fctx.pop();
                result
            }
        }
    }

    pub(crate) fn def_eq_core(&self, other: &Rule, mctx: &mut MetaCtx) -> bool {
        match (self, other) {
            (Rule::Proves(a), Rule::Proves(b)) => mctx.def_eq_core(&a.target, &b.target),
            (Rule::Implies(a), Rule::Implies(b)) => {
                a.lhs.def_eq_core(&b.lhs, mctx) && a.rhs.def_eq_core(&b.rhs, mctx)
            }
            (Rule::All(a), Rule::All(b)) => {
                a.binder_ty == b.binder_ty && a.body.def_eq_core(&b.body, mctx)
            }
            _ => false,
        }
    }

    /// Definitional equality of rules, threading metavariable assignments
    /// through the components. Failure leaves `mctx` untouched.
    pub fn is_def_eq(&self, other: &Rule, mctx: &mut MetaCtx) -> bool {
        let mut trial = mctx.clone();
        if self.def_eq_core(other, &mut trial) {
            *mctx = trial;
            true
        } else {
            false
        }
    }
}

/// ```text
///
/// --------------- (R named c)
/// Γ | Φ ⊢ c : R
///
/// ---------------- (R ∈ Φ at i)
/// Γ | Φ ⊢ «i» : R
///
/// Γ | Φ, P ⊢ h : Q
/// ----------------------------
/// Γ | Φ ⊢ assume P, h : P => Q
///
/// Γ | Φ ⊢ h₁ : P => Q    Γ | Φ ⊢ h₂ : P
/// --------------------------------------
/// Γ | Φ ⊢ h₁ h₂ : Q
///
/// Γ, x : τ | Φ↑ ⊢ h : P
/// ----------------------------------------
/// Γ | Φ ⊢ take (x : τ), h : !! x : τ, P
///
/// Γ | Φ ⊢ h : !! x : τ, P
/// ------------------------- (Γ ⊢ m : τ)
/// Γ | Φ ⊢ h[m] : P[m/x]
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Proof {
    Hole(Id),
    Ax(Name),
    Hyp(usize),
    ImpIntro(Arc<ProofImpIntro>),
    ImpElim(Arc<ProofImpElim>),
    AllIntro(Arc<ProofAllIntro>),
    AllElim(Arc<ProofAllElim>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofImpIntro {
    pub lhs: Rule,
    pub body: Proof,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofImpElim {
    pub fun: Proof,
    pub arg: Proof,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofAllIntro {
    pub binder_name: Name,
    pub binder_ty: Ty,
    pub body: Proof,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofAllElim {
    pub body: Proof,
    pub arg: Term,
}

#[inline]
pub fn mk_proof_hole(id: Id) -> Proof {
    Proof::Hole(id)
}

#[inline]
pub fn mk_proof_ax(name: Name) -> Proof {
    Proof::Ax(name)
}

#[inline]
pub fn mk_proof_hyp(index: usize) -> Proof {
    Proof::Hyp(index)
}

#[inline]
pub fn mk_proof_imp_intro(lhs: Rule, body: Proof) -> Proof {
    Proof::ImpIntro(Arc::new(ProofImpIntro { lhs, body }))
}

#[inline]
pub fn mk_proof_imp_elim(fun: Proof, arg: Proof) -> Proof {
    Proof::ImpElim(Arc::new(ProofImpElim { fun, arg }))
}

#[inline]
pub fn mk_proof_all_intro(binder_name: Name, binder_ty: Ty, body: Proof) -> Proof {
    Proof::AllIntro(Arc::new(ProofAllIntro {
        binder_name,
        binder_ty,
        body,
    }))
}

#[inline]
pub fn mk_proof_all_elim(body: Proof, arg: Term) -> Proof {
    Proof::AllElim(Arc::new(ProofAllElim { body, arg }))
}

impl std::fmt::Display for Proof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Proof::Hole(id) => write!(f, "?{}", id),
            Proof::Ax(name) => write!(f, "{}", name),
            Proof::Hyp(index) => write!(f, "«{}»", index),
            Proof::ImpIntro(inner) => write!(f, "assume {}, {}", inner.lhs, inner.body),
            Proof::ImpElim(inner) => write!(f, "({}) ({})", inner.fun, inner.arg),
            Proof::AllIntro(inner) => write!(
                f,
                "take ({} : {}), {}",
                inner.binder_name, inner.binder_ty, inner.body
            ),
            Proof::AllElim(inner) => write!(f, "({})[{}]", inner.body, inner.arg),
        }
    }
}

impl Proof {
    /// Replaces solved holes by their proofs, recursively, so that a fully
    /// solved proof script yields a closed proof.
    pub fn inst_hole(&self, proofs: &HashMap<Id, Proof>) -> Proof {
        match self {
            Proof::Hole(id) => match proofs.get(id) {
                Some(proof) => proof.inst_hole(proofs),
                None => self.clone(),
            },
            Proof::Ax(_) | Proof::Hyp(_) => self.clone(),
            Proof::ImpIntro(inner) => {
                mk_proof_imp_intro(inner.lhs.clone(), inner.body.inst_hole(proofs))
            }
            Proof::ImpElim(inner) => {
                mk_proof_imp_elim(inner.fun.inst_hole(proofs), inner.arg.inst_hole(proofs))
            }
            Proof::AllIntro(inner) => mk_proof_all_intro(
                inner.binder_name,
                inner.binder_ty.clone(),
                inner.body.inst_hole(proofs),
            ),
            Proof::AllElim(inner) => {
                mk_proof_all_elim(inner.body.inst_hole(proofs), inner.arg.clone())
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ProofError {
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("proposition expected, got a term of type {ty}")]
    PropExpected { ty: Ty },
    #[error("unknown axiom: `{name}`")]
    UnknownAxiom { name: Name },
    #[error("invalid hypothesis index {index}")]
    InvalidHyp { index: usize },
    #[error("proof contains an unfilled hole ?{id}")]
    UnresolvedHole { id: Id },
    #[error("implication expected, got {rule}")]
    ImpExpected { rule: Rule },
    #[error("universal expected, got {rule}")]
    AllExpected { rule: Rule },
    #[error("instantiation type mismatch: expected {expected}, got {got}")]
    InstMismatch { expected: Ty, got: Ty },
    #[error("rule mismatch: expected {expected}, got {got}")]
    RuleMismatch { expected: Rule, got: Rule },
}

#[derive(Debug, Clone, Copy)]
pub struct Env<'a> {
    pub consts: &'a HashMap<Name, Ty>,
    pub axioms: &'a HashMap<Name, Rule>,
}

impl Env<'_> {
    pub fn tt_env(&self) -> tt::Env<'_> {
        tt::Env {
            consts: self.consts,
        }
    }

    /// Checks a proof and returns the rule it establishes. `ctx` is the
    /// hypothesis stack (`Hyp(0)` is the newest entry) and `fctx` the free
    /// variable stack. Hypotheses are lifted when the check descends under
    /// a `take`, which keeps their indices pointing at the binders they
    /// were stated under.
    pub fn check(
        &self,
        mctx: &mut MetaCtx,
        ctx: &mut Vec<Rule>,
        fctx: &mut Vec<(Name, Ty)>,
        h: &Proof,
    ) -> Result<Rule, ProofError> {
        match h {
            Proof::Hole(id) => Err(ProofError::UnresolvedHole { id: *id }),
            Proof::Ax(name) => self
                .axioms
                .get(name)
                .cloned()
                .ok_or(ProofError::UnknownAxiom { name: *name }),
            Proof::Hyp(index) => ctx
                .get(ctx.len().wrapping_sub(index + 1))
                .cloned()
                .ok_or(ProofError::InvalidHyp { index: *index }),
            Proof::ImpIntro(inner) => {
                inner.lhs.is_wf(self.tt_env(), mctx, fctx)?;
                ctx.push(inner.lhs.clone());
                let rhs = self.check(mctx, ctx, fctx, &inner.body);
                ctx.pop();
                Ok(mk_rule_implies(inner.lhs.clone(), rhs?))
            }
            Proof::ImpElim(inner) => {
                let fun_rule = self.check(mctx, ctx, fctx, &inner.fun)?;
                let Rule::Implies(imp) = fun_rule else {
                    return Err(ProofError::ImpExpected { rule: fun_rule });
                };
                let arg_rule = self.check(mctx, ctx, fctx, &inner.arg)?;
                if !imp.lhs.is_def_eq(&arg_rule, mctx) {
                    return Err(ProofError::RuleMismatch {
                        expected: imp.lhs.clone(),
                        got: arg_rule,
                    });
                }
                Ok(imp.rhs.clone())
            }
            Proof::AllIntro(inner) => {
                let mut lifted_ctx: Vec<Rule> =
                    ctx.iter().map(|rule| rule.lift_free(1, 0)).collect();
                fctx.push((inner.binder_name, inner.binder_ty.clone()));
                let body = self.check(mctx, &mut lifted_ctx, fctx, &inner.body);
                fctx.pop();
                Ok(mk_rule_all(
                    inner.binder_name,
                    inner.binder_ty.clone(),
                    body?,
                ))
            }
            Proof::AllElim(inner) => {
                let body_rule = self.check(mctx, ctx, fctx, &inner.body)?;
                let Rule::All(all) = body_rule else {
                    return Err(ProofError::AllExpected { rule: body_rule });
                };
                let arg_ty = self
                    .tt_env()
                    .infer_type(mctx, fctx, &mut vec![], &inner.arg)?;
                if arg_ty != all.binder_ty {
                    return Err(ProofError::InstMismatch {
                        expected: all.binder_ty.clone(),
                        got: arg_ty,
                    });
                }
                Ok(all.body.subst_free(&inner.arg, 0))
            }
        }
    }
}
