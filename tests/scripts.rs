use std::sync::Arc;

use holt::{File, process};

fn run(input: &str) -> Result<(), String> {
    process(Arc::new(File::new("<test>", input))).map_err(|err| format!("{:#}", err))
}

#[test]
fn empty_script_succeeds() {
    run("").unwrap();
}

#[test]
fn whitespace_only_script_succeeds() {
    run(" \t\r\n ").unwrap();
}

#[test]
fn unknown_constant_is_reported() {
    let err = run("axiom p : P").unwrap_err();
    assert!(err.contains("unknown const: `P`"), "error was: {err}");
}

#[test]
fn trivial_tautology() {
    run(r#"
notation : 1024 "Prop" : ty := Prop
notation : 1024 "p" : Prop := p
axiom ax1 : p
prove t1 : p by apply ax1
"#)
    .unwrap();
}

#[test]
fn implication_introduction() {
    run(r#"
notation : 1024 "Prop" : ty := Prop
notation : 1024 "p" : Prop := p
prove t : p => p by intro h apply h
"#)
    .unwrap();
}

#[test]
fn assum_solves_from_the_context() {
    run(r#"
notation : 1024 "Prop" : ty := Prop
notation : 1024 "p" : Prop := p
prove t : p => p by intro h assum
"#)
    .unwrap();
}

#[test]
fn universal_introduction_and_elimination() {
    run(r#"
notation : 1024 "T" : ty := T
notation : 1024 "P" (T : 0) : Prop := P
axiom ax : !! x : T, P x
prove t : !! y : T, P y by intro y apply ax y
"#)
    .unwrap();
}

#[test]
fn have_defers_a_lemma() {
    run(r#"
notation : 1024 "Prop" : ty := Prop
notation : 1024 "p" : Prop := p
prove t : p => p => p by intro h1 intro h2 have h3 : p by apply h1 apply h3
"#)
    .unwrap();
}

#[test]
fn unsolved_goals_are_listed() {
    let err = run(r#"
notation : 1024 "Prop" : ty := Prop
notation : 1024 "p" : Prop := p
notation : 1024 "q" : Prop := q
prove t : p => q by intro h
"#)
    .unwrap_err();
    assert!(err.contains("unsolved goal"), "error was: {err}");
    assert!(err.contains("(h : p)"), "error was: {err}");
    assert!(err.contains("⊢ q"), "error was: {err}");
}

#[test]
fn installed_notations_lex_as_separators() {
    // "&&" becomes a separator, so `p&&q` splits without spaces; the
    // leading slot makes the new rule participate as an infix operator
    run(r#"
notation : 1024 "Prop" : ty := Prop
notation : 1024 "p" : Prop := p
notation : 1024 "q" : Prop := q
notation : 35 (Prop : 36) "&&" (Prop : 35) : Prop := and
axiom both : p&&q
prove t : p && q by apply both
"#)
    .unwrap();
}

#[test]
fn nested_universals_instantiate_in_order() {
    // argument slots at 1024 bind tighter than application, so `Q x y`
    // reads as two separate arguments
    run(r#"
notation : 1024 "T" : ty := T
notation : 1024 "Q" (T : 1024) (T : 1024) : Prop := Q
axiom ax : !! x y : T, Q x y
prove t : !! a b : T, Q a b by intro a b apply ax a b
"#)
    .unwrap();
}

#[test]
fn apply_under_an_implication_premise() {
    run(r#"
notation : 1024 "Prop" : ty := Prop
notation : 1024 "p" : Prop := p
notation : 1024 "q" : Prop := q
axiom mp : p => q
axiom ax_p : p
prove t : q by apply mp apply ax_p
"#)
    .unwrap();
}

#[test]
fn garbage_input_is_a_parse_error() {
    let err = run("florb").unwrap_err();
    assert!(err.contains("parse error"), "error was: {err}");
}

#[test]
fn committed_rules_fail_fatally() {
    let err = run("axiom : p").unwrap_err();
    assert!(err.contains("expected identifier"), "error was: {err}");
}

#[test]
fn duplicate_axioms_are_rejected() {
    let err = run(r#"
notation : 1024 "Prop" : ty := Prop
notation : 1024 "p" : Prop := p
axiom ax : p
axiom ax : p
"#)
    .unwrap_err();
    assert!(err.contains("already declared"), "error was: {err}");
}

#[test]
fn duplicate_constants_are_rejected() {
    let err = run(r#"
notation : 1024 "Prop" : ty := Prop
notation : 1024 "p" : Prop := x
notation : 1024 "q" : Prop := x
"#)
    .unwrap_err();
    assert!(err.contains("already declared"), "error was: {err}");
}

#[test]
fn unsolvable_apply_reports_not_def_eq() {
    let err = run(r#"
notation : 1024 "Prop" : ty := Prop
notation : 1024 "p" : Prop := p
notation : 1024 "q" : Prop := q
axiom ax : p
prove t : q by apply ax
"#)
    .unwrap_err();
    assert!(err.contains("not definitionally equal"), "error was: {err}");
}

#[test]
fn intro_on_a_bare_proposition_fails() {
    let err = run(r#"
notation : 1024 "Prop" : ty := Prop
notation : 1024 "p" : Prop := p
axiom ax : p
prove t : p by intro h
"#)
    .unwrap_err();
    assert!(err.contains("intro failed"), "error was: {err}");
}

#[test]
fn lambda_arguments_to_apply() {
    // apply a universal over a function type to an explicit lambda
    run(r#"
notation : 1024 "T" : ty := T
notation : 1024 "Prop" : ty := Prop
notation : 1024 "R" (T -> T : 0) : Prop := R
axiom ax : !! f : T -> T, R f
prove t : R (\ x : T, x) by apply ax (\ x : T, x)
"#)
    .unwrap();
}

#[test]
fn proved_theorems_become_usable_axioms() {
    run(r#"
notation : 1024 "Prop" : ty := Prop
notation : 1024 "p" : Prop := p
axiom ax : p
prove t1 : p by apply ax
prove t2 : p by apply t1
"#)
    .unwrap();
}
