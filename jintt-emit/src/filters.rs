#![forbid(unsafe_code)]

//! Filter-name mapping from the source dialect to the target dialect.
//!
//! Each entry carries one of four dispositions. Names absent from the table
//! pass through unchanged as `base | name(args)` so unknown filters survive
//! translation in a greppable form.

use std::collections::HashMap;
use std::fmt;

/// Bespoke formatter receiving the emitted base expression and the emitted
/// argument strings.
pub type CustomFn = Box<dyn Fn(&str, &[String]) -> String + Send + Sync>;

pub enum FilterRule {
    /// Rewrite to a virtual method: `base.<name>(args?)`.
    Vmethod(String),
    /// Rewrite to a target filter: `base | <name>(args?)`.
    Filter(String),
    /// Hand the pieces to a formatter closure.
    Custom(CustomFn),
    /// Elide the application and keep the base expression.
    Drop,
}

impl fmt::Debug for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterRule::Vmethod(name) => f.debug_tuple("Vmethod").field(name).finish(),
            FilterRule::Filter(name) => f.debug_tuple("Filter").field(name).finish(),
            FilterRule::Custom(_) => f.write_str("Custom(..)"),
            FilterRule::Drop => f.write_str("Drop"),
        }
    }
}

pub struct FilterTable {
    rules: HashMap<String, FilterRule>,
}

impl FilterTable {
    pub fn new() -> Self {
        let mut table = Self {
            rules: HashMap::new(),
        };
        table.install_builtins();
        table
    }

    /// Adds or overrides an entry. User entries shadow the builtins.
    pub fn insert(&mut self, name: impl Into<String>, rule: FilterRule) {
        self.rules.insert(name.into(), rule);
    }

    pub fn get(&self, name: &str) -> Option<&FilterRule> {
        self.rules.get(name)
    }

    fn install_builtins(&mut self) {
        let vmethods = [
            ("upper", "upper"),
            ("lower", "lower"),
            ("capitalize", "ucfirst"),
            ("trim", "trim"),
            ("first", "first"),
            ("last", "last"),
            ("length", "size"),
            ("count", "size"),
            ("reverse", "reverse"),
            ("sort", "sort"),
            ("join", "join"),
            ("unique", "unique"),
            ("batch", "batch"),
            ("slice", "slice"),
            ("replace", "replace"),
            ("dictsort", "sort"),
            ("items", "pairs"),
            ("int", "int"),
            ("select", "grep"),
        ];
        for (name, tt) in vmethods {
            self.insert(name, FilterRule::Vmethod(tt.to_string()));
        }

        let filters = [
            ("title", "title"),
            ("striptags", "html_strip"),
            ("escape", "html_entity"),
            ("e", "html_entity"),
            ("forceescape", "html_entity"),
            ("truncate", "truncate"),
            ("wordwrap", "wrap"),
            ("center", "center"),
            ("indent", "indent"),
            ("format", "format"),
            ("urlencode", "uri"),
            ("tojson", "json"),
            ("pprint", "dumper"),
        ];
        for (name, tt) in filters {
            self.insert(name, FilterRule::Filter(tt.to_string()));
        }

        self.insert(
            "abs",
            FilterRule::Custom(Box::new(|base: &str, _: &[String]| format!("({base} >= 0 ? {base} : -{base})"))),
        );
        self.insert(
            "round",
            FilterRule::Custom(Box::new(|base: &str, args: &[String]| {
                let digits = args.first().map(String::as_str).unwrap_or("0");
                format!("format({base}, '%.{digits}f')")
            })),
        );
        for name in ["default", "d"] {
            self.insert(
                name,
                FilterRule::Custom(Box::new(|base: &str, args: &[String]| {
                    let fallback = args.first().map(String::as_str).unwrap_or("''");
                    format!("({base} || {fallback})")
                })),
            );
        }
        self.insert(
            "min",
            FilterRule::Custom(Box::new(|base: &str, _: &[String]| format!("{base}.sort.first"))),
        );
        self.insert(
            "max",
            FilterRule::Custom(Box::new(|base: &str, _: &[String]| format!("{base}.sort.last"))),
        );
        self.insert(
            "wordcount",
            FilterRule::Custom(Box::new(|base: &str, _: &[String]| format!("{base}.split.size"))),
        );
        self.insert(
            "attr",
            FilterRule::Custom(Box::new(|base: &str, args: &[String]| {
                let key = args.first().map(String::as_str).unwrap_or("''");
                format!("{base}.{}", key.trim_matches('\''))
            })),
        );

        for name in ["safe", "float", "list", "string"] {
            self.insert(name, FilterRule::Drop);
        }
    }
}

impl Default for FilterTable {
    fn default() -> Self {
        Self::new()
    }
}
