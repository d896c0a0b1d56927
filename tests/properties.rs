use std::io::Cursor;

use proptest::prelude::*;
use pyline::{detect_mode, execute, ErrorKind, ExecMode, Value};

const GROUPS: [(&str, &str, ExecMode); 3] = [
    ("input", "binput", ExecMode::OnceInput),
    ("lines", "blines", ExecMode::OnceLines),
    ("line", "bline", ExecMode::EachLine),
];

fn collect(expr: &str, input: &str) -> Vec<String> {
    let mode = detect_mode(expr).unwrap();
    execute(expr, mode, Cursor::new(input.to_string()), "utf-8")
        .unwrap()
        .map(|r| r.map(|v: Value| v.repr()).unwrap())
        .collect()
}

proptest! {
    #[test]
    fn each_line_yields_one_result_per_line(lines in prop::collection::vec("[a-zA-Z0-9 ]{0,12}", 0..20)) {
        let input: String = lines.iter().map(|l| format!("{l}\n")).collect();
        let out = collect("len(line)", &input);
        prop_assert_eq!(out.len(), lines.len());
        for (line, n) in lines.iter().zip(&out) {
            prop_assert_eq!(n, &line.len().to_string());
        }
    }

    #[test]
    fn evaluation_is_deterministic(lines in prop::collection::vec("[a-z]{1,8}", 1..10)) {
        let input = lines.join("\n");
        let expr = r#"",".join(sorted(l.upper() for l in lines))"#;
        prop_assert_eq!(collect(expr, &input), collect(expr, &input));
    }

    #[test]
    fn one_group_picks_its_mode(group in 0usize..3, use_text in any::<bool>(), use_binary in any::<bool>()) {
        let (text, binary, mode) = GROUPS[group];
        let names: Vec<&str> = [(use_text, text), (use_binary, binary)]
            .into_iter()
            .filter_map(|(on, name)| on.then_some(name))
            .collect();
        let expr = if names.is_empty() { "1".to_string() } else { format!("[{}]", names.join(", ")) };
        let expected = if names.is_empty() { ExecMode::Once } else { mode };
        prop_assert_eq!(detect_mode(&expr).unwrap(), expected);
    }

    #[test]
    fn two_groups_abort(a in 0usize..3, b in 0usize..3, flavor_a in any::<bool>(), flavor_b in any::<bool>()) {
        prop_assume!(a != b);
        let pick = |g: usize, text: bool| if text { GROUPS[g].0 } else { GROUPS[g].1 };
        let expr = format!("({}, {})", pick(a, flavor_a), pick(b, flavor_b));
        prop_assert_eq!(detect_mode(&expr).unwrap_err().kind(), ErrorKind::Configuration);
    }
}
