use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::config::ConfigError;
use crate::types::ResourceLimits;

/// A language served by a worker instance
///
/// The set is closed: every dispatch on it is an exhaustive `match`, so adding a
/// variant forces every toolchain and driver decision to be revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Cpp,
    JavaScript,
}

impl Language {
    /// Every supported language
    pub const ALL: [Language; 3] = [Language::Python, Language::Cpp, Language::JavaScript];

    /// Wire name used in configuration and in `/health`
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Cpp => "cpp",
            Language::JavaScript => "javascript",
        }
    }

    /// Whether submitted code can be called through a named entry point
    pub fn supports_entry_point(&self) -> bool {
        match self {
            Language::Python | Language::JavaScript => true,
            Language::Cpp => false,
        }
    }

    /// Check that `name` can be spliced into a driver as a plain identifier
    pub fn is_valid_identifier(&self, name: &str) -> bool {
        let extra = match self {
            Language::Python | Language::Cpp => None,
            Language::JavaScript => Some('$'),
        };
        let allowed_start = |c: char| c.is_ascii_alphabetic() || c == '_' || Some(c) == extra;

        let mut chars = name.chars();
        match chars.next() {
            Some(first) if allowed_start(first) => {
                chars.all(|c| allowed_start(c) || c.is_ascii_digit())
            }
            _ => false,
        }
    }

    /// Built-in toolchain used when the configuration does not override it
    pub fn default_toolchain(&self) -> Toolchain {
        match self {
            Language::Python => Toolchain {
                source_name: "solution.py".to_owned(),
                compile: None,
                run: RunConfig {
                    command: vec!["python3".to_owned(), "{source}".to_owned()],
                    env: HashMap::from([
                        ("PYTHONDONTWRITEBYTECODE".to_owned(), "1".to_owned()),
                        ("PYTHONIOENCODING".to_owned(), "utf-8".to_owned()),
                    ]),
                    path: default_sandbox_path(),
                    memory_rlimit: MemoryRlimit::AddressSpace,
                    limits: None,
                },
            },
            Language::Cpp => Toolchain {
                source_name: "solution.cpp".to_owned(),
                compile: Some(CompileConfig {
                    command: vec![
                        "g++".to_owned(),
                        "-std=c++17".to_owned(),
                        "-O2".to_owned(),
                        "-o".to_owned(),
                        "{output}".to_owned(),
                        "{source}".to_owned(),
                    ],
                    output_name: "solution".to_owned(),
                    env: HashMap::new(),
                    limits: None,
                }),
                run: RunConfig {
                    command: vec!["{binary}".to_owned()],
                    env: HashMap::new(),
                    path: default_sandbox_path(),
                    memory_rlimit: MemoryRlimit::AddressSpace,
                    limits: None,
                },
            },
            Language::JavaScript => Toolchain {
                source_name: "solution.js".to_owned(),
                compile: None,
                run: RunConfig {
                    command: vec!["node".to_owned(), "{source}".to_owned()],
                    env: HashMap::new(),
                    path: default_sandbox_path(),
                    // V8 reserves far more address space than it commits
                    memory_rlimit: MemoryRlimit::Data,
                    // The runtime alone needs a good part of the 128 MB default
                    limits: Some(ResourceLimits::unset().with_memory_limit(512)),
                },
            },
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(Language::Python),
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            _ => Err(ConfigError::UnknownLanguage(s.to_owned())),
        }
    }
}

impl Serialize for Language {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"one of \"python\", \"cpp\" or \"javascript\"",
            )
        })
    }
}

/// Compile and run commands for one language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toolchain {
    /// Source file name in the scratch directory (e.g., "solution.cpp")
    pub source_name: String,

    /// Compilation configuration (None for interpreted languages)
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    /// Execution configuration
    pub run: RunConfig,
}

impl Toolchain {
    /// Check if the toolchain has a compile step
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// Name of the file test processes execute
    pub fn artifact_name(&self) -> &str {
        match self.compile {
            Some(ref compile) => &compile.output_name,
            None => &self.source_name,
        }
    }

    /// Expand placeholders in the given command
    pub fn expand_command(command: &[String], source: &str, binary: &str) -> Vec<String> {
        command
            .iter()
            .map(|arg| {
                arg.replace("{source}", source)
                    .replace("{output}", binary)
                    .replace("{binary}", binary)
            })
            .collect()
    }
}

/// Configuration for the compilation step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {output}
    pub command: Vec<String>,

    /// Output binary name (e.g., "solution")
    pub output_name: String,

    /// Environment variables to set during compilation
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Resource limits for compilation (overrides compile defaults)
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

/// Default PATH for sandboxed processes
pub const DEFAULT_SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Which rlimit carries the memory ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryRlimit {
    /// RLIMIT_AS: caps virtual address space
    #[default]
    AddressSpace,

    /// RLIMIT_DATA: caps heap and data segments, for runtimes that map large
    /// virtual regions up front
    Data,
}

/// Configuration for the execution step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {binary}
    pub command: Vec<String>,

    /// Environment Variables to set
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// PATH environment variable for the child
    #[serde(default = "default_sandbox_path")]
    pub path: String,

    /// Which rlimit enforces the memory ceiling
    #[serde(default)]
    pub memory_rlimit: MemoryRlimit,

    /// Resource limits for execution (overrides defaults)
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

fn default_sandbox_path() -> String {
    DEFAULT_SANDBOX_PATH.to_owned()
}

/// Check that a configured file name stays inside the scratch directory
pub(crate) fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && name != "." && name != ".."
}
