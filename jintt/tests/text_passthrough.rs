use proptest::prelude::*;

proptest! {
    // Text containing no tag openers is a fixed point of transpilation.
    // `{` is excluded because every default opener starts with it; `%`, `#`
    // and `}` are harmless on their own.
    #[test]
    fn delimiter_free_text_is_a_fixed_point(
        text in r#"[a-zA-Z0-9 \t\n.,:;!?%#}<>/='"_-]{0,256}"#
    ) {
        let out = jintt::transpile(&text).unwrap();
        prop_assert_eq!(out, text);
    }

    // The `x` prefix keeps generated names clear of word operators and
    // literal keywords (`in`, `is`, `true`, ...).
    #[test]
    fn interpolated_names_round_trip_structurally(
        name in "x[a-z0-9_]{0,12}"
    ) {
        let src = format!("{{{{ {name} }}}}");
        let out = jintt::transpile(&src).unwrap();
        prop_assert_eq!(out, format!("[% {name} %]"));
    }
}

#[test]
fn empty_input_is_empty_output() {
    assert_eq!(jintt::transpile("").unwrap(), "");
}
