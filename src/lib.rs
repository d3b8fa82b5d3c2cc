use std::sync::Arc;

use anyhow::Context;

use parse::{Parser, nt_command};

pub mod cmd;
pub mod elab;
pub mod lex;
pub mod parse;
pub mod proof;
pub mod tactic;
pub mod tt;

pub use cmd::Eval;
pub use lex::File;

/// Runs a script of commands against a fresh core state. Parsing stops
/// cleanly once no tokens remain; any parse or command failure is
/// surfaced as the first error.
pub fn process(file: Arc<File>) -> anyhow::Result<()> {
    let mut eval = Eval::default();
    let mut lex = lex::Lex::new(file);
    loop {
        if lex.is_eof(&eval.trie) {
            break;
        }
        let cmd = Parser::new(&mut lex, &eval.grammar, &eval.trie)
            .parse(nt_command(), 0)
            .context("parse error")?;
        eval.run_cmd(&cmd).context("command error")?;
    }
    Ok(())
}
