use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use glob::Pattern;
use regex::Regex;
use serde::Deserialize;

use crate::graph::NodeKind;

pub const MAX_FILES_DEFAULT: usize = 500;
pub const MAX_DEPTH_DEFAULT: usize = 3;
pub const OVERLAY_FILE_NAME: &str = ".strata.yml";

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Pattern(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Yaml(err) => write!(f, "{err}"),
            Self::Pattern(detail) => write!(f, "invalid pattern: {detail}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(value)
    }
}

#[derive(Debug)]
pub struct SymbolPattern {
    pub kind: NodeKind,
    pub pattern: Regex,
}

/// Block-style import syntax (Go's `import ( … )`): explicit enter/exit
/// markers plus the pattern applied to lines inside the block.
#[derive(Debug)]
pub struct BlockImport {
    pub open: String,
    pub close: String,
    pub inner: Regex,
}

/// Immutable extraction rules, injected into the pipeline so the language
/// tables are substitutable in tests.
#[derive(Debug)]
pub struct Ruleset {
    lang_by_ext: HashMap<String, String>,
    shebang_hints: Vec<(String, String)>,
    import_patterns: HashMap<String, Vec<Regex>>,
    block_imports: HashMap<String, BlockImport>,
    symbol_patterns: HashMap<String, Vec<SymbolPattern>>,
    entry_stems: HashSet<String>,
    build_files: HashSet<String>,
    skip_dirs: HashSet<String>,
    exclude: Vec<Pattern>,
}

impl Ruleset {
    pub fn builtin() -> Result<Self, ConfigError> {
        let lang_by_ext = [
            (".py", "python"),
            (".pyi", "python"),
            (".js", "javascript"),
            (".mjs", "javascript"),
            (".cjs", "javascript"),
            (".jsx", "javascript"),
            (".ts", "typescript"),
            (".tsx", "typescript"),
            (".go", "go"),
            (".java", "java"),
            (".kt", "kotlin"),
            (".kts", "kotlin"),
            (".rs", "rust"),
            (".c", "c"),
            (".h", "c"),
            (".cpp", "cpp"),
            (".cc", "cpp"),
            (".cxx", "cpp"),
            (".hpp", "cpp"),
            (".hh", "cpp"),
            (".rb", "ruby"),
            (".rake", "ruby"),
            (".nix", "nix"),
            (".ex", "elixir"),
            (".exs", "elixir"),
            (".php", "php"),
            (".sh", "shell"),
            (".bash", "shell"),
            (".zsh", "shell"),
            (".fish", "shell"),
            (".lua", "lua"),
            (".swift", "swift"),
            (".scala", "scala"),
            (".zig", "zig"),
            (".tf", "hcl"),
            (".hcl", "hcl"),
            (".yml", "yaml"),
            (".yaml", "yaml"),
            (".toml", "toml"),
            (".json", "json"),
            (".md", "markdown"),
            (".mdx", "markdown"),
            (".sql", "sql"),
            (".graphql", "graphql"),
            (".gql", "graphql"),
            (".proto", "protobuf"),
            (".css", "css"),
            (".scss", "scss"),
            (".less", "less"),
            (".html", "html"),
            (".htm", "html"),
            (".svelte", "svelte"),
            (".vue", "vue"),
        ]
        .into_iter()
        .map(|(ext, lang)| (ext.to_string(), lang.to_string()))
        .collect();

        let shebang_hints = [
            ("python", "python"),
            ("node", "javascript"),
            ("ruby", "ruby"),
            ("bash", "shell"),
            ("sh", "shell"),
            ("perl", "perl"),
            ("elixir", "elixir"),
            ("php", "php"),
        ]
        .into_iter()
        .map(|(hint, lang)| (hint.to_string(), lang.to_string()))
        .collect();

        let import_table: &[(&str, &[&str])] = &[
            ("python", &[r"^import\s+(\S+)", r"^from\s+(\S+)\s+import"]),
            (
                "javascript",
                &[
                    r#"import\s+.*?from\s+['"](\..*?)['"]"#,
                    r#"require\(\s*['"](\..*?)['"]\s*\)"#,
                ],
            ),
            (
                "typescript",
                &[
                    r#"import\s+.*?from\s+['"](\..*?)['"]"#,
                    r#"require\(\s*['"](\..*?)['"]\s*\)"#,
                ],
            ),
            ("go", &[r#"^import\s+"([^"]+)""#]),
            ("java", &[r"^import\s+([\w.]+);"]),
            ("kotlin", &[r"^import\s+([\w.]+)"]),
            ("rust", &[r"^use\s+([\w:]+)", r"^mod\s+(\w+)"]),
            ("c", &[r#"^#include\s*[<"](.+)[>"]"#]),
            ("cpp", &[r#"^#include\s*[<"](.+)[>"]"#]),
            (
                "ruby",
                &[
                    r#"^require\s+['"](.+)['"]"#,
                    r#"^require_relative\s+['"](.+)['"]"#,
                ],
            ),
            ("nix", &[r"import\s+(\./[\w/.-]+)"]),
            ("elixir", &[r"^\s*(?:import|alias|use)\s+([\w.]+)"]),
            (
                "php",
                &[
                    r"^use\s+([\w\\]+)",
                    r#"(?:require|include)(?:_once)?\s+['"](.+)['"]"#,
                ],
            ),
        ];
        let mut import_patterns = HashMap::new();
        for (lang, patterns) in import_table {
            let mut compiled = Vec::with_capacity(patterns.len());
            for pattern in *patterns {
                compiled.push(compile(pattern)?);
            }
            import_patterns.insert(lang.to_string(), compiled);
        }

        let mut block_imports = HashMap::new();
        block_imports.insert(
            "go".to_string(),
            BlockImport {
                open: "import (".to_string(),
                close: ")".to_string(),
                inner: compile(r#""([^"]+)""#)?,
            },
        );

        use NodeKind::{Class, Function, Module, Type};
        let symbol_table: &[(&str, &[(NodeKind, &str)])] = &[
            (
                "python",
                &[
                    (Function, r"^\s*(?:async\s+)?def\s+(\w+)"),
                    (Class, r"^\s*class\s+(\w+)"),
                ],
            ),
            (
                "javascript",
                &[
                    (Function, r"^\s*(?:export\s+)?(?:async\s+)?function\s+(\w+)"),
                    (Function, r"^\s*(?:export\s+)?(?:const|let|var)\s+(\w+)\s*="),
                    (Class, r"^\s*(?:export\s+)?class\s+(\w+)"),
                ],
            ),
            (
                "typescript",
                &[
                    (Function, r"^\s*(?:export\s+)?(?:async\s+)?function\s+(\w+)"),
                    (Function, r"^\s*(?:export\s+)?(?:const|let|var)\s+(\w+)\s*="),
                    (Class, r"^\s*(?:export\s+)?class\s+(\w+)"),
                    (Type, r"^\s*(?:export\s+)?(?:interface|type)\s+(\w+)"),
                ],
            ),
            (
                "go",
                &[
                    (Function, r"^func\s+(?:\(.*?\)\s+)?(\w+)"),
                    (Class, r"^type\s+(\w+)\s+struct\b"),
                    (Type, r"^type\s+(\w+)\s+interface\b"),
                ],
            ),
            (
                "java",
                &[
                    (
                        Class,
                        r"^\s*(?:public|private|protected)?\s*(?:static\s+)?(?:abstract\s+)?class\s+(\w+)",
                    ),
                    (Type, r"^\s*(?:public|private|protected)?\s*interface\s+(\w+)"),
                    (
                        Function,
                        r"^\s*(?:public|private|protected)\s+(?:static\s+)?[\w<>\[\]]+\s+(\w+)\s*\(",
                    ),
                ],
            ),
            (
                "kotlin",
                &[
                    (Class, r"^\s*(?:data\s+|sealed\s+|abstract\s+)?class\s+(\w+)"),
                    (Type, r"^\s*interface\s+(\w+)"),
                    (Function, r"^\s*(?:fun|suspend\s+fun)\s+(\w+)"),
                ],
            ),
            (
                "rust",
                &[
                    (Function, r"^\s*(?:pub\s+)?(?:async\s+)?fn\s+(\w+)"),
                    (Class, r"^\s*(?:pub\s+)?struct\s+(\w+)"),
                    (Type, r"^\s*(?:pub\s+)?(?:trait|enum)\s+(\w+)"),
                ],
            ),
            (
                "c",
                &[
                    (Class, r"^\s*(?:typedef\s+)?struct\s+(\w+)"),
                    (Type, r"^\s*typedef\s+.*\s+(\w+)\s*;"),
                ],
            ),
            (
                "cpp",
                &[
                    (Class, r"^\s*class\s+(\w+)"),
                    (Class, r"^\s*(?:typedef\s+)?struct\s+(\w+)"),
                    (Type, r"^\s*typedef\s+.*\s+(\w+)\s*;"),
                ],
            ),
            (
                "ruby",
                &[
                    (Function, r"^\s*def\s+(\w+)"),
                    (Class, r"^\s*class\s+(\w+)"),
                    (Module, r"^\s*module\s+(\w+)"),
                ],
            ),
            ("nix", &[(Function, r"^\s*(\w+)\s*=\s*(?:.*:)?\s*\{")]),
            (
                "elixir",
                &[
                    (Function, r"^\s*defp?\s+(\w+)"),
                    (Module, r"^\s*defmodule\s+([\w.]+)"),
                ],
            ),
            (
                "php",
                &[
                    (
                        Function,
                        r"^\s*(?:public|private|protected)?\s*(?:static\s+)?function\s+(\w+)",
                    ),
                    (Class, r"^\s*class\s+(\w+)"),
                    (Type, r"^\s*interface\s+(\w+)"),
                ],
            ),
            (
                "swift",
                &[
                    (
                        Function,
                        r"^\s*(?:public\s+|private\s+|internal\s+)?func\s+(\w+)",
                    ),
                    (
                        Class,
                        r"^\s*(?:public\s+|private\s+|internal\s+)?(?:class|struct)\s+(\w+)",
                    ),
                    (
                        Type,
                        r"^\s*(?:public\s+|private\s+|internal\s+)?(?:protocol|enum)\s+(\w+)",
                    ),
                ],
            ),
            (
                "scala",
                &[
                    (Class, r"^\s*(?:case\s+)?class\s+(\w+)"),
                    (Type, r"^\s*trait\s+(\w+)"),
                    (Function, r"^\s*def\s+(\w+)"),
                ],
            ),
        ];
        let mut symbol_patterns = HashMap::new();
        for (lang, patterns) in symbol_table {
            let mut compiled = Vec::with_capacity(patterns.len());
            for (kind, pattern) in *patterns {
                compiled.push(SymbolPattern {
                    kind: *kind,
                    pattern: compile(pattern)?,
                });
            }
            symbol_patterns.insert(lang.to_string(), compiled);
        }

        let entry_stems = ["main", "index", "app", "server", "routes", "cli", "cmd"]
            .into_iter()
            .map(str::to_string)
            .collect();

        let build_files = [
            "Makefile",
            "makefile",
            "GNUmakefile",
            "pom.xml",
            "build.gradle",
            "build.gradle.kts",
            "package.json",
            "go.mod",
            "Cargo.toml",
            "flake.nix",
            "default.nix",
            "shell.nix",
            "CMakeLists.txt",
            "pyproject.toml",
            "setup.py",
            "setup.cfg",
            "Gemfile",
            "Rakefile",
            "mix.exs",
            "composer.json",
            "Dockerfile",
            "docker-compose.yml",
            "docker-compose.yaml",
            "justfile",
            "Taskfile.yml",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        let skip_dirs = [
            ".git",
            "node_modules",
            "__pycache__",
            ".venv",
            "venv",
            "vendor",
            "dist",
            "build",
            "target",
            ".tox",
            ".mypy_cache",
            ".pytest_cache",
            ".eggs",
            ".bundle",
            ".cargo",
            "deps",
            "_build",
            ".strata",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        Ok(Self {
            lang_by_ext,
            shebang_hints,
            import_patterns,
            block_imports,
            symbol_patterns,
            entry_stems,
            build_files,
            skip_dirs,
            exclude: Vec::new(),
        })
    }

    pub fn lang_for_ext(&self, ext: &str) -> Option<&str> {
        self.lang_by_ext.get(ext).map(String::as_str)
    }

    pub fn lang_for_shebang(&self, first_line: &str) -> Option<&str> {
        if !first_line.starts_with("#!") {
            return None;
        }
        self.shebang_hints
            .iter()
            .find(|(hint, _)| first_line.contains(hint.as_str()))
            .map(|(_, lang)| lang.as_str())
    }

    pub fn import_patterns(&self, lang: &str) -> &[Regex] {
        self.import_patterns
            .get(lang)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn block_import(&self, lang: &str) -> Option<&BlockImport> {
        self.block_imports.get(lang)
    }

    pub fn symbol_patterns(&self, lang: &str) -> &[SymbolPattern] {
        self.symbol_patterns
            .get(lang)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_entry_stem(&self, stem: &str) -> bool {
        self.entry_stems.contains(stem)
    }

    pub fn is_build_file(&self, file_name: &str) -> bool {
        self.build_files.contains(file_name)
    }

    pub fn should_skip_dir(&self, dir_name: &str) -> bool {
        self.skip_dirs.contains(dir_name)
    }

    pub fn is_excluded(&self, rel_path: &Path) -> bool {
        self.exclude
            .iter()
            .any(|pattern| pattern.matches_path(rel_path))
    }

    pub fn apply_overlay(&mut self, overlay: &Overlay) -> Result<(), ConfigError> {
        for raw in &overlay.exclude {
            let pattern =
                Pattern::new(raw).map_err(|err| ConfigError::Pattern(format!("{raw}: {err}")))?;
            self.exclude.push(pattern);
        }
        for stem in &overlay.entry_stems {
            self.entry_stems.insert(stem.clone());
        }
        Ok(())
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|err| ConfigError::Pattern(format!("{pattern}: {err}")))
}

/// Optional `.strata.yml` at the indexed root. CLI flags win over the
/// budget fields here.
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct Overlay {
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub entry_stems: Vec<String>,
    #[serde(default)]
    pub max_files: Option<usize>,
    #[serde(default)]
    pub max_depth: Option<usize>,
}

pub fn load_overlay(root: &Path) -> Result<Option<Overlay>, ConfigError> {
    let path = root.join(OVERLAY_FILE_NAME);
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    let overlay: Overlay = serde_yaml::from_str(&content)?;
    Ok(Some(overlay))
}
