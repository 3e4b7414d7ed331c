use clusterscope_sparql::{Query, Row, Term};
use proptest::prelude::*;

fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

proptest! {
    #[test]
    fn plain_literals_stay_on_one_line_and_keep_their_text(text in ".*") {
        let rendered = Term::literal(text.clone()).to_sparql().unwrap();
        prop_assert!(rendered.starts_with('"') && rendered.ends_with('"'));
        prop_assert!(!rendered.contains('\n') && !rendered.contains('\r'));
        prop_assert_eq!(unescape(&rendered), text);
    }

    #[test]
    fn values_clause_lists_every_binding(vars in prop::collection::btree_set("[a-z]{1,6}", 1..5)) {
        let mut query = Query::new("t", "SELECT * WHERE { ?s ?p ?o }");
        for var in &vars {
            query = query.bind(var.clone(), Term::iri(format!("http://ex/{var}")));
        }
        let rendered = query.render().unwrap();
        prop_assert!(rendered.starts_with("SELECT * WHERE {\n"), "rendered query missing SELECT prefix: {:?}", rendered);
        prop_assert!(rendered.ends_with(" ?s ?p ?o }"), "rendered query missing pattern suffix: {:?}", rendered);
        let values = rendered.lines().nth(1).unwrap().trim_start();
        prop_assert!(values.starts_with("VALUES ( "));
        for var in &vars {
            let needle = format!("?{var} ");
            let iri = format!("<http://ex/{var}>");
            prop_assert!(values.contains(&needle));
            prop_assert!(values.contains(&iri));
        }
    }

    #[test]
    fn counts_accept_any_non_negative_integer(n in 0u32..1_000_000) {
        let row = Row::new()
            .with("a", Term::integer(i64::from(n)))
            .with("b", Term::literal(format!("{n}.0")));
        prop_assert_eq!(row.count("a").unwrap(), Some(u64::from(n)));
        prop_assert_eq!(row.count("b").unwrap(), Some(u64::from(n)));
    }
}
