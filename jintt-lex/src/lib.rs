#![forbid(unsafe_code)]

mod lexer;
mod token;

pub use lexer::{Delimiters, LexError, Lexer};
pub use token::{Token, TokenKind};

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lex_plain_text_is_one_token_plus_eof() {
        assert_eq!(
            kinds("Hello World"),
            vec![TokenKind::Text("Hello World".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn lex_variable_tag() {
        assert_eq!(
            kinds("{{ name }}"),
            vec![
                TokenKind::VarStart { strip: false },
                TokenKind::Name("name".to_string()),
                TokenKind::VarEnd { strip: false },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_strip_markers() {
        assert_eq!(
            kinds("{{- name -}}"),
            vec![
                TokenKind::VarStart { strip: true },
                TokenKind::Name("name".to_string()),
                TokenKind::VarEnd { strip: true },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_minus_before_closer_is_strip_not_subtraction() {
        assert_eq!(
            kinds("{{ a - b -}}"),
            vec![
                TokenKind::VarStart { strip: false },
                TokenKind::Name("a".to_string()),
                TokenKind::Minus,
                TokenKind::Name("b".to_string()),
                TokenKind::VarEnd { strip: true },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_word_operators_are_operators_not_names() {
        assert_eq!(
            kinds("{{ a and not b in c }}"),
            vec![
                TokenKind::VarStart { strip: false },
                TokenKind::Name("a".to_string()),
                TokenKind::KwAnd,
                TokenKind::KwNot,
                TokenKind::Name("b".to_string()),
                TokenKind::KwIn,
                TokenKind::Name("c".to_string()),
                TokenKind::VarEnd { strip: false },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_word_operator_prefix_stays_a_name() {
        assert_eq!(
            kinds("{{ android }}"),
            vec![
                TokenKind::VarStart { strip: false },
                TokenKind::Name("android".to_string()),
                TokenKind::VarEnd { strip: false },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_string_lexeme_keeps_quotes_and_hides_closers() {
        assert_eq!(
            kinds(r#"{{ "a }} b" }}"#),
            vec![
                TokenKind::VarStart { strip: false },
                TokenKind::Str(r#""a }} b""#.to_string()),
                TokenKind::VarEnd { strip: false },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_number_lexeme_is_kept_verbatim() {
        assert_eq!(
            kinds("{{ 1_000.5e3 }}"),
            vec![
                TokenKind::VarStart { strip: false },
                TokenKind::Number("1_000.5e3".to_string()),
                TokenKind::VarEnd { strip: false },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_dict_brace_does_not_reenter_text_mode() {
        assert_eq!(
            kinds("{{ {'a': 1} }}"),
            vec![
                TokenKind::VarStart { strip: false },
                TokenKind::LBrace,
                TokenKind::Str("'a'".to_string()),
                TokenKind::Colon,
                TokenKind::Number("1".to_string()),
                TokenKind::RBrace,
                TokenKind::VarEnd { strip: false },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_comment_is_trimmed_and_whole() {
        assert_eq!(
            kinds("a{#- hi there -#}b"),
            vec![
                TokenKind::Text("a".to_string()),
                TokenKind::Comment("hi there".to_string()),
                TokenKind::Text("b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_statement_tag() {
        assert_eq!(
            kinds("{% if user %}"),
            vec![
                TokenKind::StmtStart { strip: false },
                TokenKind::Name("if".to_string()),
                TokenKind::Name("user".to_string()),
                TokenKind::StmtEnd { strip: false },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_unterminated_variable_tag_is_fatal() {
        let err = Lexer::new("{{ name").lex().unwrap_err();
        assert!(err.message.contains("unterminated variable tag"));
    }

    #[test]
    fn lex_unterminated_statement_tag_is_fatal() {
        let err = Lexer::new("text {% if x").lex().unwrap_err();
        assert!(err.message.contains("unterminated statement tag"));
    }

    #[test]
    fn lex_unknown_characters_are_skipped() {
        assert_eq!(
            kinds("{{ a @ b }}"),
            vec![
                TokenKind::VarStart { strip: false },
                TokenKind::Name("a".to_string()),
                TokenKind::Name("b".to_string()),
                TokenKind::VarEnd { strip: false },
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_custom_delimiters() {
        let delims = Delimiters {
            stmt_open: "<%".to_string(),
            stmt_close: "%>".to_string(),
            var_open: "<<".to_string(),
            var_close: ">>".to_string(),
            comment_open: "<#".to_string(),
            comment_close: "#>".to_string(),
        };
        let toks: Vec<TokenKind> = Lexer::with_delimiters("<< x >> {{ y }}", &delims)
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            toks,
            vec![
                TokenKind::VarStart { strip: false },
                TokenKind::Name("x".to_string()),
                TokenKind::VarEnd { strip: false },
                TokenKind::Text(" {{ y }}".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_tag_pairs_are_matched() {
        let tokens = Lexer::new("{{ a }}x{% if b %}{{ c }}{% endif %}")
            .lex()
            .unwrap();
        let mut open: Option<&TokenKind> = None;
        for t in &tokens {
            match &t.kind {
                TokenKind::VarStart { .. } | TokenKind::StmtStart { .. } => {
                    assert!(open.is_none(), "tag start inside an open tag");
                    open = Some(&t.kind);
                }
                TokenKind::VarEnd { .. } => {
                    assert!(matches!(open, Some(TokenKind::VarStart { .. })));
                    open = None;
                }
                TokenKind::StmtEnd { .. } => {
                    assert!(matches!(open, Some(TokenKind::StmtStart { .. })));
                    open = None;
                }
                _ => {}
            }
        }
        assert!(open.is_none());
        assert_eq!(tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));
    }
}
