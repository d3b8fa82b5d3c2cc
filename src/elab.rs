use std::collections::HashMap;

use anyhow::{anyhow, bail};

use crate::parse::{ParserDescr, ParserRule, Syntax, SyntaxNode, nt_term};
use crate::proof::{Rule, mk_rule_all, mk_rule_implies, mk_rule_proves};
use crate::tactic::{ApplyArg, TacticState};
use crate::tt::{Name, Term, Ty, mk_app, mk_bvar, mk_const, mk_fvar, mk_lam, mk_ty_arrow, mk_ty_base};

#[derive(Debug, Clone)]
pub enum NotationItem {
    Atom(String),
    Slot { ty: Ty, prec: usize },
}

/// A user notation: the constant it elaborates to and its matched shape,
/// in source order.
#[derive(Debug, Clone)]
pub struct Notation {
    pub name: Name,
    pub items: Vec<NotationItem>,
}

#[derive(Debug, Clone)]
pub enum NotationTarget {
    /// An ordinary notation: declares a term constant of the curried type.
    Term { const_ty: Ty },
    /// Result type written as the bare `ty`: declares a base type and
    /// extends the type grammar instead.
    Ty,
}

/// Everything a `notation` command contributes to the core state.
#[derive(Debug, Clone)]
pub struct NotationDecl {
    pub name: Name,
    pub notation: Notation,
    pub parser_rule: ParserRule,
    pub keywords: Vec<String>,
    pub target: NotationTarget,
}

#[derive(Debug, Clone)]
pub enum ApplyArgStx {
    Ident(Name),
    Term(Syntax),
}

/// An elaborated tactic. Term and rule payloads stay syntactic: they are
/// elaborated against the head goal's free context at execution time.
#[derive(Debug, Clone)]
pub enum Tactic {
    Assum,
    Intro(Name),
    Apply { name: Name, args: Vec<ApplyArgStx> },
    Have { name: Name, rule: Syntax, script: Vec<Tactic> },
}

pub(crate) fn intern(value: &str) -> anyhow::Result<Name> {
    Name::intern(value).map_err(|_| anyhow!("invalid identifier `{}`", value))
}

#[derive(Debug, Clone, Copy)]
pub struct Elab<'a> {
    pub notations: &'a [Notation],
    pub ty_notations: &'a [Notation],
}

impl Elab<'_> {
    pub fn elab_ty(&self, stx: &Syntax) -> anyhow::Result<Ty> {
        let Some(node) = stx.as_node() else {
            bail!("unsupported type syntax: {}", stx);
        };
        match node.args.as_slice() {
            [Syntax::Ident(x)] => Ok(mk_ty_base(intern(x)?)),
            [Syntax::Atom(paren), inner, Syntax::Atom(_)] if paren == "(" => self.elab_ty(inner),
            [lhs, Syntax::Atom(arrow), rhs] if arrow == "->" => {
                Ok(mk_ty_arrow(self.elab_ty(lhs)?, self.elab_ty(rhs)?))
            }
            _ => {
                for notation in self.ty_notations {
                    if matches_atoms(&notation.items, &node.args) {
                        return Ok(mk_ty_base(notation.name));
                    }
                }
                bail!("unsupported type syntax: {}", stx)
            }
        }
    }

    /// Elaborates a term. Identifiers resolve to bound variables, then free
    /// variables, then constants; `bv_map` and `fv_map` record the depth at
    /// which each binder was introduced.
    pub fn elab_term(
        &self,
        stx: &Syntax,
        bdepth: usize,
        fdepth: usize,
        bv_map: &HashMap<Name, usize>,
        fv_map: &HashMap<Name, usize>,
    ) -> anyhow::Result<Term> {
        let Some(node) = stx.as_node() else {
            bail!("unsupported term syntax: {}", stx);
        };
        match node.args.as_slice() {
            [Syntax::Ident(x)] => {
                let name = intern(x)?;
                if let Some(&intro_depth) = bv_map.get(&name) {
                    Ok(mk_bvar(bdepth - (intro_depth + 1)))
                } else if let Some(&level) = fv_map.get(&name) {
                    Ok(mk_fvar(fdepth - (level + 1)))
                } else {
                    Ok(mk_const(name))
                }
            }
            [Syntax::Atom(paren), inner, Syntax::Atom(_)] if paren == "(" => {
                self.elab_term(inner, bdepth, fdepth, bv_map, fv_map)
            }
            [Syntax::Atom(lam), Syntax::Ident(x), Syntax::Atom(_), ty, Syntax::Atom(_), body]
                if lam == "\\" =>
            {
                let name = intern(x)?;
                let binder_ty = self.elab_ty(ty)?;
                let mut bv_map = bv_map.clone();
                bv_map.insert(name, bdepth);
                let body = self.elab_term(body, bdepth + 1, fdepth, &bv_map, fv_map)?;
                Ok(mk_lam(name, binder_ty, body))
            }
            [fun @ Syntax::Node(_), arg @ Syntax::Node(_)] => Ok(mk_app(
                self.elab_term(fun, bdepth, fdepth, bv_map, fv_map)?,
                self.elab_term(arg, bdepth, fdepth, bv_map, fv_map)?,
            )),
            _ => {
                for notation in self.notations {
                    if let Some(term) =
                        self.match_notation(notation, node, bdepth, fdepth, bv_map, fv_map)
                    {
                        return Ok(term);
                    }
                }
                bail!("unsupported term syntax: {}", stx)
            }
        }
    }

    /// A notation matches when the arity agrees, atoms sit in their
    /// positions, and every slot elaborates; the result applies the
    /// constant to the slot terms left-associatively in source order.
    fn match_notation(
        &self,
        notation: &Notation,
        node: &SyntaxNode,
        bdepth: usize,
        fdepth: usize,
        bv_map: &HashMap<Name, usize>,
        fv_map: &HashMap<Name, usize>,
    ) -> Option<Term> {
        if notation.items.len() != node.args.len() {
            return None;
        }
        let mut term = mk_const(notation.name);
        for (item, arg) in notation.items.iter().zip(&node.args) {
            match item {
                NotationItem::Atom(lit) => match arg {
                    Syntax::Atom(value) if value == lit => {}
                    _ => return None,
                },
                NotationItem::Slot { .. } => {
                    let slot = self.elab_term(arg, bdepth, fdepth, bv_map, fv_map).ok()?;
                    term = mk_app(term, slot);
                }
            }
        }
        Some(term)
    }

    pub fn elab_rule(
        &self,
        stx: &Syntax,
        fdepth: usize,
        fv_map: &HashMap<Name, usize>,
    ) -> anyhow::Result<Rule> {
        let Some(node) = stx.as_node() else {
            bail!("unsupported rule syntax: {}", stx);
        };
        match node.args.as_slice() {
            [Syntax::Atom(paren), inner, Syntax::Atom(_)] if paren == "(" => {
                self.elab_rule(inner, fdepth, fv_map)
            }
            [term @ Syntax::Node(_)] => Ok(mk_rule_proves(self.elab_term(
                term,
                0,
                fdepth,
                &HashMap::new(),
                fv_map,
            )?)),
            [lhs, Syntax::Atom(arrow), rhs] if arrow == "=>" => Ok(mk_rule_implies(
                self.elab_rule(lhs, fdepth, fv_map)?,
                self.elab_rule(rhs, fdepth, fv_map)?,
            )),
            [Syntax::Atom(forall), Syntax::Node(binders), Syntax::Atom(_), ty, Syntax::Atom(_), body]
                if forall == "!!" =>
            {
                let binder_ty = self.elab_ty(ty)?;
                let mut names = vec![];
                for binder in &binders.args {
                    let Some(x) = binder.as_ident() else {
                        bail!("expected a binder name, got {}", binder);
                    };
                    names.push(intern(x)?);
                }
                let mut fv_map = fv_map.clone();
                let mut depth = fdepth;
                for &name in &names {
                    fv_map.insert(name, depth);
                    depth += 1;
                }
                let mut rule = self.elab_rule(body, depth, &fv_map)?;
                for &name in names.iter().rev() {
                    rule = mk_rule_all(name, binder_ty.clone(), rule);
                }
                Ok(rule)
            }
            _ => bail!("unsupported rule syntax: {}", stx),
        }
    }

    /// Builds everything a `notation` command declares: the notation
    /// record, its parser rule, the separator keywords, and the constant
    /// type with the slots curried in source order.
    pub fn elab_notation(
        &self,
        items_stx: &[Syntax],
        name: Name,
        prec: usize,
        result_ty: &Syntax,
    ) -> anyhow::Result<NotationDecl> {
        let mut items = vec![];
        for item in items_stx {
            match item {
                Syntax::Str(lit) => {
                    if lit.is_empty() {
                        bail!("empty notation symbol");
                    }
                    items.push(NotationItem::Atom(lit.clone()));
                }
                Syntax::Node(node) => match node.args.as_slice() {
                    [Syntax::Atom(_), ty, Syntax::Atom(_), Syntax::Num(slot_prec), Syntax::Atom(_)] => {
                        items.push(NotationItem::Slot {
                            ty: self.elab_ty(ty)?,
                            prec: *slot_prec,
                        });
                    }
                    _ => bail!("unsupported notation item: {}", item),
                },
                _ => bail!("unsupported notation item: {}", item),
            }
        }

        let descrs = items
            .iter()
            .map(|item| match item {
                NotationItem::Atom(lit) => ParserDescr::Symbol(lit.clone()),
                NotationItem::Slot { prec, .. } => ParserDescr::Recurse(nt_term(), *prec),
            })
            .collect();
        let parser_rule = ParserRule::new(prec, descrs);
        let keywords = items
            .iter()
            .filter_map(|item| match item {
                NotationItem::Atom(lit) => Some(lit.clone()),
                NotationItem::Slot { .. } => None,
            })
            .collect();

        // a result type written as the bare identifier `ty` declares a
        // base type rather than a term constant
        let is_ty_decl =
            matches!(result_ty.as_node(), Some(node) if matches!(node.args.as_slice(), [Syntax::Ident(x)] if x == "ty"));
        let target = if is_ty_decl {
            if items
                .iter()
                .any(|item| matches!(item, NotationItem::Slot { .. }))
            {
                bail!("a type notation cannot take term slots");
            }
            NotationTarget::Ty
        } else {
            let mut const_ty = self.elab_ty(result_ty)?;
            for item in items.iter().rev() {
                if let NotationItem::Slot { ty, .. } = item {
                    const_ty = mk_ty_arrow(ty.clone(), const_ty);
                }
            }
            NotationTarget::Term { const_ty }
        };

        Ok(NotationDecl {
            name,
            notation: Notation { name, items },
            parser_rule,
            keywords,
            target,
        })
    }

    pub fn elab_tactics(&self, stx: &Syntax) -> anyhow::Result<Vec<Tactic>> {
        let Some(node) = stx.as_node() else {
            bail!("expected a tactic sequence, got {}", stx);
        };
        let mut tactics = vec![];
        for tactic in &node.args {
            self.elab_tactic(tactic, &mut tactics)?;
        }
        Ok(tactics)
    }

    fn elab_tactic(&self, stx: &Syntax, out: &mut Vec<Tactic>) -> anyhow::Result<()> {
        let Some(node) = stx.as_node() else {
            bail!("unsupported tactic syntax: {}", stx);
        };
        match node.args.as_slice() {
            [Syntax::Atom(assum)] if assum == "assum" => out.push(Tactic::Assum),
            [Syntax::Atom(intro), Syntax::Node(binders)] if intro == "intro" => {
                for binder in &binders.args {
                    let Some(x) = binder.as_ident() else {
                        bail!("expected a binder name, got {}", binder);
                    };
                    out.push(Tactic::Intro(intern(x)?));
                }
            }
            [Syntax::Atom(apply), Syntax::Ident(x), Syntax::Node(args)] if apply == "apply" => {
                let mut apply_args = vec![];
                for arg in &args.args {
                    let Some(arg_node) = arg.as_node() else {
                        bail!("unsupported apply argument: {}", arg);
                    };
                    match arg_node.args.as_slice() {
                        [Syntax::Ident(value)] => {
                            apply_args.push(ApplyArgStx::Ident(intern(value)?));
                        }
                        [term @ Syntax::Node(_)] => {
                            apply_args.push(ApplyArgStx::Term(term.clone()));
                        }
                        _ => bail!("unsupported apply argument: {}", arg),
                    }
                }
                out.push(Tactic::Apply {
                    name: intern(x)?,
                    args: apply_args,
                });
            }
            [Syntax::Atom(have), Syntax::Ident(x), Syntax::Atom(_), rule, Syntax::Atom(_), script]
                if have == "have" =>
            {
                out.push(Tactic::Have {
                    name: intern(x)?,
                    rule: rule.clone(),
                    script: self.elab_tactics(script)?,
                });
            }
            _ => bail!("unsupported tactic syntax: {}", stx),
        }
        Ok(())
    }

    /// Runs one tactic against the head goal. Term and rule arguments are
    /// elaborated here, with the free-variable map derived from the goal's
    /// current free context.
    pub fn run_tactic(&self, ts: &mut TacticState<'_>, tactic: &Tactic) -> anyhow::Result<()> {
        if let Some(goal) = ts.goals.first() {
            log::debug!("goal: {}", goal);
        }
        match tactic {
            Tactic::Assum => ts.assumption()?,
            Tactic::Intro(name) => ts.intro(*name)?,
            Tactic::Apply { name, args } => {
                let (fdepth, fv_map) = self.goal_fv_map(ts)?;
                let mut apply_args = vec![];
                for arg in args {
                    match arg {
                        ApplyArgStx::Ident(value) => apply_args.push(ApplyArg::Ident(*value)),
                        ApplyArgStx::Term(stx) => {
                            let term =
                                self.elab_term(stx, 0, fdepth, &HashMap::new(), &fv_map)?;
                            apply_args.push(ApplyArg::Term(term));
                        }
                    }
                }
                ts.apply(*name, apply_args)?;
            }
            Tactic::Have { name, rule, script } => {
                let (fdepth, fv_map) = self.goal_fv_map(ts)?;
                let rule = self.elab_rule(rule, fdepth, &fv_map)?;
                ts.have(*name, rule)?;
                for tactic in script {
                    self.run_tactic(ts, tactic)?;
                }
            }
        }
        Ok(())
    }

    fn goal_fv_map(&self, ts: &TacticState<'_>) -> anyhow::Result<(usize, HashMap<Name, usize>)> {
        let goal = ts
            .goals
            .first()
            .ok_or_else(|| anyhow!("no goals"))?;
        let mut fv_map = HashMap::new();
        for (level, (name, _)) in goal.fctx.iter().enumerate() {
            fv_map.insert(*name, level);
        }
        Ok((goal.fctx.len(), fv_map))
    }
}

fn matches_atoms(items: &[NotationItem], args: &[Syntax]) -> bool {
    items.len() == args.len()
        && items.iter().zip(args).all(|(item, arg)| match item {
            NotationItem::Atom(lit) => matches!(arg, Syntax::Atom(value) if value == lit),
            NotationItem::Slot { .. } => false,
        })
}
