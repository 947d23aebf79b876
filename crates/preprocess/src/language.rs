use std::fmt;
use std::path::Path;

/// Source language of a scanned file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
    C,
    Cpp,
    CSharp,
    Java,
    Kotlin,
    Swift,
    Ruby,
    Shell,
    Unknown,
}

/// Comment and quote markers used by the lexer and heuristic backends.
#[derive(Debug, Clone, Copy)]
pub struct Syntax {
    pub line_comments: &'static [&'static str],
    pub block_comments: &'static [(&'static str, &'static str)],
    pub quotes: &'static [char],
    /// Quotes whose literals may span lines.
    pub multiline_quotes: &'static [char],
    pub triple_quotes: bool,
}

const C_STYLE: Syntax = Syntax {
    line_comments: &["//"],
    block_comments: &[("/*", "*/")],
    quotes: &['"', '\''],
    multiline_quotes: &[],
    triple_quotes: false,
};

const RUST: Syntax = Syntax {
    line_comments: &["//"],
    block_comments: &[("/*", "*/")],
    // Single quotes are lifetimes as often as char literals.
    quotes: &['"'],
    multiline_quotes: &['"'],
    triple_quotes: false,
};

const JS: Syntax = Syntax {
    line_comments: &["//"],
    block_comments: &[("/*", "*/")],
    quotes: &['"', '\'', '`'],
    multiline_quotes: &['`'],
    triple_quotes: false,
};

const GO: Syntax = Syntax {
    line_comments: &["//"],
    block_comments: &[("/*", "*/")],
    quotes: &['"', '\'', '`'],
    multiline_quotes: &['`'],
    triple_quotes: false,
};

const KOTLIN_SWIFT: Syntax = Syntax {
    line_comments: &["//"],
    block_comments: &[("/*", "*/")],
    quotes: &['"', '\''],
    multiline_quotes: &[],
    triple_quotes: true,
};

const PYTHON: Syntax = Syntax {
    line_comments: &["#"],
    block_comments: &[],
    quotes: &['"', '\''],
    multiline_quotes: &[],
    triple_quotes: true,
};

const RUBY: Syntax = Syntax {
    line_comments: &["#"],
    block_comments: &[("=begin", "=end")],
    quotes: &['"', '\''],
    multiline_quotes: &['"', '\''],
    triple_quotes: false,
};

const SHELL: Syntax = Syntax {
    line_comments: &["#"],
    block_comments: &[],
    quotes: &['"', '\''],
    multiline_quotes: &['"', '\''],
    triple_quotes: false,
};

const PLAIN: Syntax = Syntax {
    line_comments: &[],
    block_comments: &[],
    quotes: &[],
    multiline_quotes: &[],
    triple_quotes: false,
};

impl Language {
    /// Detect language from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" | "pyw" | "pyi" => Language::Python,
            "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "go" => Language::Go,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Language::Cpp,
            "cs" => Language::CSharp,
            "java" => Language::Java,
            "kt" | "kts" => Language::Kotlin,
            "swift" => Language::Swift,
            "rb" => Language::Ruby,
            "sh" | "bash" | "zsh" => Language::Shell,
            _ => Language::Unknown,
        }
    }

    /// Detect language from file path
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// Parses a language name as produced by [`Language::as_str`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "rust" => Language::Rust,
            "python" => Language::Python,
            "javascript" | "js" => Language::JavaScript,
            "typescript" | "ts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "go" | "golang" => Language::Go,
            "c" => Language::C,
            "cpp" | "c++" => Language::Cpp,
            "csharp" | "c#" => Language::CSharp,
            "java" => Language::Java,
            "kotlin" => Language::Kotlin,
            "swift" => Language::Swift,
            "ruby" => Language::Ruby,
            "shell" | "bash" | "sh" => Language::Shell,
            _ => Language::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::Go => "go",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Java => "java",
            Language::Kotlin => "kotlin",
            Language::Swift => "swift",
            Language::Ruby => "ruby",
            Language::Shell => "shell",
            Language::Unknown => "unknown",
        }
    }

    pub fn syntax(self) -> Syntax {
        match self {
            Language::Rust => RUST,
            Language::Python => PYTHON,
            Language::JavaScript | Language::TypeScript | Language::Tsx => JS,
            Language::Go => GO,
            Language::C | Language::Cpp | Language::CSharp | Language::Java => C_STYLE,
            Language::Kotlin | Language::Swift => KOTLIN_SWIFT,
            Language::Ruby => RUBY,
            Language::Shell => SHELL,
            Language::Unknown => PLAIN,
        }
    }

    /// Languages with a C-style preprocessor (`#if 0` blocks).
    pub fn has_preprocessor(self) -> bool {
        matches!(self, Language::C | Language::Cpp | Language::CSharp)
    }

    /// Grammar for the tree-sitter backend, when one is bundled.
    pub fn tree_sitter_language(self) -> Option<tree_sitter::Language> {
        match self {
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
