use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{bail, ensure};

use crate::elab::{Elab, Notation, NotationTarget, intern};
use crate::lex::SepTrie;
use crate::parse::{
    Grammar, ParserDescr, ParserRule, Syntax, nt_apply_arg, nt_command, nt_notation, nt_rule,
    nt_tactic, nt_term, nt_ty,
};
use crate::proof::{self, Rule, mk_proof_hole};
use crate::tactic::TacticState;
use crate::tt::{self, MetaCtx, Name, Ty};

const INITIAL_SEPARATORS: &[&str] = &[
    "(", ")", "->", "\\", ":", ",", "!!", "=>", ":=", "assum", "intro", "apply", "have",
    "notation", "axiom", "prove", "by",
];

fn sym(lit: &str) -> ParserDescr {
    ParserDescr::Symbol(lit.to_owned())
}

fn recurse(nt: Name, min_prec: usize) -> ParserDescr {
    ParserDescr::Recurse(nt, min_prec)
}

fn many(descr: ParserDescr) -> ParserDescr {
    ParserDescr::Many(Arc::new(descr))
}

fn many1(descr: ParserDescr) -> ParserDescr {
    ParserDescr::Many1(Arc::new(descr))
}

/// The persistent core state threaded through the command loop: the
/// grammar and separator set (both extended by `notation`), the notation
/// tables, and the declared constants, types, and axioms.
#[derive(Debug, Clone)]
pub struct Eval {
    pub grammar: Grammar,
    pub trie: SepTrie,
    notations: Vec<Notation>,
    ty_notations: Vec<Notation>,
    consts: HashMap<Name, Ty>,
    ty_consts: HashSet<Name>,
    axioms: HashMap<Name, Rule>,
}

impl Default for Eval {
    fn default() -> Self {
        let mut trie = SepTrie::default();
        for sep in INITIAL_SEPARATORS {
            trie.insert(sep);
        }

        let mut grammar = Grammar::default();

        // command := 'notation' ':' num notation+ ':' ty ':=' ident
        //          | 'axiom' ident ':' rule
        //          | 'prove' ident ':' rule 'by' tactic*
        grammar.add_rule(
            nt_command(),
            ParserRule::new(
                1024,
                vec![
                    sym("notation"),
                    sym(":"),
                    ParserDescr::Num,
                    many1(recurse(nt_notation(), 0)),
                    sym(":"),
                    recurse(nt_ty(), 0),
                    sym(":="),
                    ParserDescr::Ident,
                ],
            ),
        );
        grammar.add_rule(
            nt_command(),
            ParserRule::new(
                1024,
                vec![sym("axiom"), ParserDescr::Ident, sym(":"), recurse(nt_rule(), 0)],
            ),
        );
        grammar.add_rule(
            nt_command(),
            ParserRule::new(
                1024,
                vec![
                    sym("prove"),
                    ParserDescr::Ident,
                    sym(":"),
                    recurse(nt_rule(), 0),
                    sym("by"),
                    many(recurse(nt_tactic(), 0)),
                ],
            ),
        );

        // notation := string | '(' ty ':' num ')'
        grammar.add_rule(nt_notation(), ParserRule::new(1024, vec![ParserDescr::Str]));
        grammar.add_rule(
            nt_notation(),
            ParserRule::new(
                1024,
                vec![sym("("), recurse(nt_ty(), 0), sym(":"), ParserDescr::Num, sym(")")],
            ),
        );

        // tactic := 'assum' | 'intro' ident+ | 'apply' ident applyArg*
        //         | 'have' ident ':' rule 'by' tactic*
        grammar.add_rule(nt_tactic(), ParserRule::new(1024, vec![sym("assum")]));
        grammar.add_rule(
            nt_tactic(),
            ParserRule::new(1024, vec![sym("intro"), many1(ParserDescr::Ident)]),
        );
        grammar.add_rule(
            nt_tactic(),
            ParserRule::new(
                1024,
                vec![
                    sym("apply"),
                    ParserDescr::Ident,
                    many(recurse(nt_apply_arg(), 0)),
                ],
            ),
        );
        grammar.add_rule(
            nt_tactic(),
            ParserRule::new(
                1024,
                vec![
                    sym("have"),
                    ParserDescr::Ident,
                    sym(":"),
                    recurse(nt_rule(), 0),
                    sym("by"),
                    many(recurse(nt_tactic(), 0)),
                ],
            ),
        );

        // applyArg := ident | term@61
        grammar.add_rule(nt_apply_arg(), ParserRule::new(1024, vec![ParserDescr::Ident]));
        grammar.add_rule(nt_apply_arg(), ParserRule::new(1024, vec![recurse(nt_term(), 61)]));

        // rule := '(' rule ')' | term | rule@31 '=>' rule@30
        //       | '!!' ident+ ':' ty ',' rule
        grammar.add_rule(
            nt_rule(),
            ParserRule::new(1024, vec![sym("("), recurse(nt_rule(), 0), sym(")")]),
        );
        grammar.add_rule(nt_rule(), ParserRule::new(1024, vec![recurse(nt_term(), 0)]));
        grammar.add_rule(
            nt_rule(),
            ParserRule::new(
                30,
                vec![recurse(nt_rule(), 31), sym("=>"), recurse(nt_rule(), 30)],
            ),
        );
        grammar.add_rule(
            nt_rule(),
            ParserRule::new(
                0,
                vec![
                    sym("!!"),
                    many1(ParserDescr::Ident),
                    sym(":"),
                    recurse(nt_ty(), 0),
                    sym(","),
                    recurse(nt_rule(), 0),
                ],
            ),
        );

        // term := '(' term ')' | ident | '\' ident ':' ty ',' term
        //       | term@0 term@1
        grammar.add_rule(
            nt_term(),
            ParserRule::new(1024, vec![sym("("), recurse(nt_term(), 0), sym(")")]),
        );
        grammar.add_rule(nt_term(), ParserRule::new(1024, vec![ParserDescr::Ident]));
        grammar.add_rule(
            nt_term(),
            ParserRule::new(
                0,
                vec![
                    sym("\\"),
                    ParserDescr::Ident,
                    sym(":"),
                    recurse(nt_ty(), 0),
                    sym(","),
                    recurse(nt_term(), 0),
                ],
            ),
        );
        grammar.add_rule(
            nt_term(),
            ParserRule::new(0, vec![recurse(nt_term(), 0), recurse(nt_term(), 1)]),
        );

        // ty := '(' ty ')' | ident | ty@31 '->' ty@30
        grammar.add_rule(
            nt_ty(),
            ParserRule::new(1024, vec![sym("("), recurse(nt_ty(), 0), sym(")")]),
        );
        grammar.add_rule(nt_ty(), ParserRule::new(1024, vec![ParserDescr::Ident]));
        grammar.add_rule(
            nt_ty(),
            ParserRule::new(30, vec![recurse(nt_ty(), 31), sym("->"), recurse(nt_ty(), 30)]),
        );

        Self {
            grammar,
            trie,
            notations: vec![],
            ty_notations: vec![],
            consts: HashMap::new(),
            ty_consts: HashSet::new(),
            axioms: HashMap::new(),
        }
    }
}

impl Eval {
    fn elab(&self) -> Elab<'_> {
        Elab {
            notations: &self.notations,
            ty_notations: &self.ty_notations,
        }
    }

    fn tt_env(&self) -> tt::Env<'_> {
        tt::Env {
            consts: &self.consts,
        }
    }

    fn is_declared(&self, name: Name) -> bool {
        self.consts.contains_key(&name) || self.ty_consts.contains(&name)
    }

    pub fn run_cmd(&mut self, stx: &Syntax) -> anyhow::Result<()> {
        let Some(node) = stx.as_node() else {
            bail!("expected a command, got {}", stx);
        };
        match node.args.first() {
            Some(Syntax::Atom(kw)) if kw == "notation" => self.cmd_notation(&node.args),
            Some(Syntax::Atom(kw)) if kw == "axiom" => self.cmd_axiom(&node.args),
            Some(Syntax::Atom(kw)) if kw == "prove" => self.cmd_prove(&node.args),
            _ => bail!("unsupported command: {}", stx),
        }
    }

    fn cmd_notation(&mut self, args: &[Syntax]) -> anyhow::Result<()> {
        let [_, _, Syntax::Num(prec), Syntax::Node(items), _, result_ty, _, Syntax::Ident(x)] =
            args
        else {
            bail!("malformed notation command");
        };
        let name = intern(x)?;
        ensure!(
            !self.is_declared(name),
            "constant `{}` already declared",
            name
        );
        let decl = self.elab().elab_notation(&items.args, name, *prec, result_ty)?;
        for keyword in &decl.keywords {
            self.trie.insert(keyword);
        }
        match decl.target {
            NotationTarget::Term { const_ty } => {
                self.grammar.add_rule(nt_term(), decl.parser_rule);
                self.notations.push(decl.notation);
                log::info!("notation `{}` : {}", name, const_ty);
                self.consts.insert(name, const_ty);
            }
            NotationTarget::Ty => {
                self.grammar.add_rule(nt_ty(), decl.parser_rule);
                self.ty_notations.push(decl.notation);
                log::info!("type notation `{}`", name);
                self.ty_consts.insert(name);
            }
        }
        Ok(())
    }

    fn cmd_axiom(&mut self, args: &[Syntax]) -> anyhow::Result<()> {
        let [_, Syntax::Ident(x), _, rule_stx] = args else {
            bail!("malformed axiom command");
        };
        let name = intern(x)?;
        ensure!(
            !self.axioms.contains_key(&name),
            "axiom `{}` already declared",
            name
        );
        let rule = self.elab().elab_rule(rule_stx, 0, &HashMap::new())?;
        rule.is_wf(self.tt_env(), &MetaCtx::default(), &mut vec![])?;
        log::info!("axiom `{}` : {}", name, rule);
        self.axioms.insert(name, rule);
        Ok(())
    }

    fn cmd_prove(&mut self, args: &[Syntax]) -> anyhow::Result<()> {
        let [_, Syntax::Ident(x), _, rule_stx, _, tactics_stx] = args else {
            bail!("malformed prove command");
        };
        let name = intern(x)?;
        ensure!(
            !self.axioms.contains_key(&name),
            "theorem `{}` already declared",
            name
        );

        let elab = self.elab();
        let rule = elab.elab_rule(rule_stx, 0, &HashMap::new())?;
        rule.is_wf(self.tt_env(), &MetaCtx::default(), &mut vec![])?;
        let tactics = elab.elab_tactics(tactics_stx)?;

        let env = proof::Env {
            consts: &self.consts,
            axioms: &self.axioms,
        };
        let mut ts = TacticState::new(env, rule.clone());
        for tactic in &tactics {
            elab.run_tactic(&mut ts, tactic)?;
        }
        if !ts.goals.is_empty() {
            let mut report = format!("{} unsolved goal(s)", ts.goals.len());
            for goal in &ts.goals {
                report.push('\n');
                report.push_str(&goal.to_string());
            }
            bail!("{}", report);
        }

        // certify the assembled proof before admitting the rule
        let proof = mk_proof_hole(ts.root()).inst_hole(&ts.proofs);
        log::debug!("proof of `{}`: {}", name, proof);
        let mut mctx = ts.mctx.clone();
        let checked = env.check(&mut mctx, &mut vec![], &mut vec![], &proof)?;
        ensure!(
            checked.is_def_eq(&rule, &mut mctx),
            "proof certifies {}, expected {}",
            checked,
            rule
        );

        log::info!("theorem `{}` : {}", name, rule);
        self.axioms.insert(name, rule);
        Ok(())
    }
}
