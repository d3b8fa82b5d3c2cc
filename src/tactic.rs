use std::collections::HashMap;

use thiserror::Error;

use crate::proof::{
    self, Proof, ProofError, Rule, mk_proof_all_elim, mk_proof_all_intro, mk_proof_ax,
    mk_proof_hole, mk_proof_hyp, mk_proof_imp_elim, mk_proof_imp_intro,
};
use crate::tt::{Id, MetaCtx, Name, Term, Ty, mk_const, mk_fvar};

#[derive(Debug, Clone)]
pub struct Hyp {
    pub name: Name,
    pub rule: Rule,
    // deferred proof installed by `have`, used in place of `Hyp(i)`
    pub deferred: Option<Proof>,
}

#[derive(Debug, Clone)]
pub struct Goal {
    pub hole: Id,
    pub target: Rule,
    /// hypothesis stack, newest last: `Hyp(0)` is the newest entry
    pub ctx: Vec<Hyp>,
    /// free-variable stack, newest last: `Fvar(0)` is the newest entry
    pub fctx: Vec<(Name, Ty)>,
}

impl std::fmt::Display for Goal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (x, t) in &self.fctx {
            write!(f, "({} : {}) ", x, t)?;
        }
        write!(f, "| ")?;
        for hyp in &self.ctx {
            write!(f, "({} : {}) ", hyp.name, hyp.rule)?;
        }
        write!(f, "⊢ {}", self.target)
    }
}

#[derive(Debug, Clone, Error)]
pub enum TacticError {
    #[error("no goals")]
    NoGoals,
    #[error("assumption failed: no hypothesis matches the target")]
    Assumption,
    #[error("intro failed: the target is neither an implication nor a universal")]
    Intro,
    #[error("unknown identifier `{name}`")]
    UnknownId { name: Name },
    #[error("rules are not definitionally equal: expected {expected}, got {got}")]
    NotDefEq { expected: Rule, got: Rule },
    #[error("type mismatch for {term}: it has type {has}, expected {expected}")]
    TypeMismatch { term: Term, has: Ty, expected: Ty },
    #[error("apply received more arguments than the rule takes")]
    ApplyExcessArgument,
    #[error("a term argument is not applicable to the current rule")]
    NotApplicable,
    #[error(transparent)]
    Kernel(#[from] ProofError),
}

#[derive(Debug, Clone)]
pub enum ApplyArg {
    Ident(Name),
    Term(Term),
}

/// The incremental proof state: open goals (the head goal is the current
/// one), proofs for solved holes, and the metavariable context. Solving all
/// goals makes `Hole(root)` resolvable into a closed proof via `inst_hole`.
#[derive(Debug, Clone)]
pub struct TacticState<'a> {
    pub goals: Vec<Goal>,
    pub proofs: HashMap<Id, Proof>,
    pub mctx: MetaCtx,
    env: proof::Env<'a>,
    root: Id,
}

impl<'a> TacticState<'a> {
    pub fn new(env: proof::Env<'a>, target: Rule) -> Self {
        let mut mctx = MetaCtx::default();
        let root = mctx.fresh_id();
        let goal = Goal {
            hole: root,
            target,
            ctx: vec![],
            fctx: vec![],
        };
        Self {
            goals: vec![goal],
            proofs: HashMap::new(),
            mctx,
            env,
            root,
        }
    }

    pub fn root(&self) -> Id {
        self.root
    }

    pub fn env(&self) -> proof::Env<'a> {
        self.env
    }

    fn head_goal(&self) -> Result<&Goal, TacticError> {
        self.goals.first().ok_or(TacticError::NoGoals)
    }

    /// Mints a fresh hole from the shared counter. The goal is returned,
    /// not enqueued; the calling tactic decides where it goes.
    fn mk_hole(&mut self, target: Rule, ctx: Vec<Hyp>, fctx: Vec<(Name, Ty)>) -> (Proof, Goal) {
        let id = self.mctx.fresh_id();
        let goal = Goal {
            hole: id,
            target,
            ctx,
            fctx,
        };
        (mk_proof_hole(id), goal)
    }

    /// Removes the head goal, prepends `new_goals`, and pushes the
    /// metavariable assignments recorded so far into every remaining goal.
    fn replace_head(&mut self, new_goals: Vec<Goal>) {
        self.goals.remove(0);
        self.goals.splice(0..0, new_goals);
        for goal in &mut self.goals {
            goal.target = goal.target.inst_meta(&self.mctx);
            for hyp in &mut goal.ctx {
                hyp.rule = hyp.rule.inst_meta(&self.mctx);
            }
        }
    }

    fn assign_proof(&mut self, hole: Id, proof: Proof) {
        self.proofs.insert(hole, proof);
    }

    fn hyp_proof(hyp: &Hyp, index: usize) -> Proof {
        hyp.deferred.clone().unwrap_or(mk_proof_hyp(index))
    }

    pub fn assumption(&mut self) -> Result<(), TacticError> {
        let goal = self.head_goal()?.clone();
        for index in 0..goal.ctx.len() {
            let hyp = &goal.ctx[goal.ctx.len() - 1 - index];
            if goal.target.is_def_eq(&hyp.rule, &mut self.mctx) {
                self.assign_proof(goal.hole, Self::hyp_proof(hyp, index));
                self.replace_head(vec![]);
                return Ok(());
            }
        }
        Err(TacticError::Assumption)
    }

    pub fn intro(&mut self, name: Name) -> Result<(), TacticError> {
        let goal = self.head_goal()?.clone();
        match &goal.target {
            Rule::Implies(imp) => {
                let mut ctx = goal.ctx.clone();
                ctx.push(Hyp {
                    name,
                    rule: imp.lhs.clone(),
                    deferred: None,
                });
                let (hole, sub) = self.mk_hole(imp.rhs.clone(), ctx, goal.fctx.clone());
                self.assign_proof(goal.hole, mk_proof_imp_intro(imp.lhs.clone(), hole));
                self.replace_head(vec![sub]);
                Ok(())
            }
            Rule::All(all) => {
                // lift the hypotheses under the new free binder so that
                // their indices keep pointing at the right variables
                let ctx = goal
                    .ctx
                    .iter()
                    .map(|hyp| Hyp {
                        name: hyp.name,
                        rule: hyp.rule.lift_free(1, 0),
                        deferred: hyp.deferred.clone(),
                    })
                    .collect();
                let mut fctx = goal.fctx.clone();
                fctx.push((name, all.binder_ty.clone()));
                let (hole, sub) = self.mk_hole(all.body.clone(), ctx, fctx);
                self.assign_proof(
                    goal.hole,
                    mk_proof_all_intro(name, all.binder_ty.clone(), hole),
                );
                self.replace_head(vec![sub]);
                Ok(())
            }
            Rule::Proves(_) => Err(TacticError::Intro),
        }
    }

    pub fn apply(&mut self, name: Name, args: Vec<ApplyArg>) -> Result<(), TacticError> {
        let goal = self.head_goal()?.clone();

        let mut found = None;
        for index in 0..goal.ctx.len() {
            let hyp = &goal.ctx[goal.ctx.len() - 1 - index];
            if hyp.name == name {
                found = Some((Self::hyp_proof(hyp, index), hyp.rule.clone()));
                break;
            }
        }
        let (mut proof, mut rule) = match found {
            Some(entry) => entry,
            None => match self.env.axioms.get(&name) {
                Some(ax) => (mk_proof_ax(name), ax.clone()),
                None => return Err(TacticError::UnknownId { name }),
            },
        };

        for arg in args {
            match arg {
                ApplyArg::Ident(arg_name) => match rule.clone() {
                    Rule::Implies(imp) => {
                        let mut entry = None;
                        for index in 0..goal.ctx.len() {
                            let hyp = &goal.ctx[goal.ctx.len() - 1 - index];
                            if hyp.name == arg_name {
                                entry = Some((hyp, index));
                                break;
                            }
                        }
                        let Some((hyp, index)) = entry else {
                            return Err(TacticError::UnknownId { name: arg_name });
                        };
                        if !imp.lhs.is_def_eq(&hyp.rule, &mut self.mctx) {
                            return Err(TacticError::NotDefEq {
                                expected: imp.lhs.clone(),
                                got: hyp.rule.clone(),
                            });
                        }
                        proof = mk_proof_imp_elim(proof, Self::hyp_proof(hyp, index));
                        rule = imp.rhs.clone();
                    }
                    Rule::All(all) => {
                        let term = match goal.fctx.iter().rposition(|(x, _)| *x == arg_name) {
                            Some(level) => mk_fvar(goal.fctx.len() - 1 - level),
                            None if self.env.consts.contains_key(&arg_name) => {
                                mk_const(arg_name)
                            }
                            None => return Err(TacticError::UnknownId { name: arg_name }),
                        };
                        (proof, rule) =
                            self.elim_with_term(proof, &all.binder_ty, &all.body, term, &goal)?;
                    }
                    Rule::Proves(_) => return Err(TacticError::ApplyExcessArgument),
                },
                ApplyArg::Term(term) => match rule.clone() {
                    Rule::All(all) => {
                        (proof, rule) =
                            self.elim_with_term(proof, &all.binder_ty, &all.body, term, &goal)?;
                    }
                    Rule::Proves(_) => return Err(TacticError::ApplyExcessArgument),
                    Rule::Implies(_) => return Err(TacticError::NotApplicable),
                },
            }
        }

        self.apply_core(proof, rule, vec![])
    }

    fn elim_with_term(
        &mut self,
        proof: Proof,
        binder_ty: &Ty,
        body: &Rule,
        term: Term,
        goal: &Goal,
    ) -> Result<(Proof, Rule), TacticError> {
        let ty = self
            .env
            .tt_env()
            .infer_type(&self.mctx, &goal.fctx, &mut vec![], &term)
            .map_err(ProofError::from)?;
        if ty != *binder_ty {
            return Err(TacticError::TypeMismatch {
                term,
                has: ty,
                expected: binder_ty.clone(),
            });
        }
        let rule = body.subst_free(&term, 0);
        Ok((mk_proof_all_elim(proof, term), rule))
    }

    /// Closes the head goal with `proof : rule` if the rule matches the
    /// target, otherwise opens premises as new goals (implications) or
    /// instantiates with fresh metavariables (universals).
    pub fn apply_core(
        &mut self,
        mut proof: Proof,
        mut rule: Rule,
        mut new_goals: Vec<Goal>,
    ) -> Result<(), TacticError> {
        let goal = self.head_goal()?.clone();
        loop {
            if rule.is_def_eq(&goal.target, &mut self.mctx) {
                self.assign_proof(goal.hole, proof);
                self.replace_head(new_goals);
                return Ok(());
            }
            match rule.clone() {
                Rule::Implies(imp) => {
                    let (hole, sub) =
                        self.mk_hole(imp.lhs.clone(), goal.ctx.clone(), goal.fctx.clone());
                    new_goals.push(sub);
                    proof = mk_proof_imp_elim(proof, hole);
                    rule = imp.rhs.clone();
                }
                Rule::All(all) => {
                    let mv = self.mctx.fresh_mvar(all.binder_ty.clone());
                    proof = mk_proof_all_elim(proof, mv.clone());
                    rule = all.body.subst_free(&mv, 0);
                }
                Rule::Proves(_) => {
                    return Err(TacticError::NotDefEq {
                        expected: goal.target.clone(),
                        got: rule,
                    });
                }
            }
        }
    }

    /// Opens a lemma goal for `rule` and reshapes the current goal so the
    /// new hypothesis is available under `name`. Using the hypothesis
    /// injects the deferred hole, to be discharged when the lemma goal is
    /// solved.
    pub fn have(&mut self, name: Name, rule: Rule) -> Result<(), TacticError> {
        let goal = self.head_goal()?.clone();
        rule.is_wf(self.env.tt_env(), &self.mctx, &mut goal.fctx.clone())?;
        let (hole, lemma_goal) = self.mk_hole(rule.clone(), goal.ctx.clone(), goal.fctx.clone());
        let mut reshaped = goal;
        // inserted at the tail so that Hyp(0) stays the most recent intro
        reshaped.ctx.insert(
            0,
            Hyp {
                name,
                rule,
                deferred: Some(hole),
            },
        );
        self.replace_head(vec![lemma_goal, reshaped]);
        Ok(())
    }
}
