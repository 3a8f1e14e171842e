//! Language registry.
//!
//! Maps the identifiers the editor uses (`javascript`, `js`, `c++`, ...) to
//! the identifiers the execution backend understands, together with display
//! metadata and a starter template. The table is built once and never
//! mutated. Identifiers the table does not know are passed through to the
//! backend unchanged so newly deployed backend languages work without a
//! client release.

use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Static description of one editor language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageDescriptor {
    /// Editor-facing identifier.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// File extension without the dot.
    pub file_extension: String,
    /// Code shown when the language is first selected.
    pub starter_template: String,
    /// Identifier sent to the execution backend.
    pub backend_id: String,
}

impl LanguageDescriptor {
    /// Descriptor for an identifier the registry does not know.
    ///
    /// Every field echoes the identifier except the template, which is empty.
    #[must_use]
    pub fn passthrough(id: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: id.to_string(),
            file_extension: id.to_string(),
            starter_template: String::new(),
            backend_id: id.to_string(),
        }
    }

    /// Editor tab name for this language, e.g. `main.py`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("main.{}", self.file_extension)
    }
}

const JAVASCRIPT_TEMPLATE: &str = r#"// Welcome to EduRun!
// Write your JavaScript code here and run it

function greetStudent(name) {
  return "Hello, " + name + "! Welcome to EduRun!";
}

console.log(greetStudent("Coder"));

// Try writing a function that adds two numbers
function addNumbers(a, b) {
  return a + b;
}

console.log("5 + 3 =", addNumbers(5, 3));"#;

const PYTHON_TEMPLATE: &str = r#"# Welcome to EduRun!
# Write your Python code here and run it

def greet_student(name):
    return f"Hello, {name}! Welcome to EduRun!"

print(greet_student("Coder"))

# Try writing a function that adds two numbers
def add_numbers(a, b):
    return a + b

print(f"5 + 3 = {add_numbers(5, 3)}")"#;

const CPP_TEMPLATE: &str = r#"// Welcome to EduRun!
// Write your C++ code here and run it

#include <iostream>
#include <string>
using namespace std;

string greetStudent(string name) {
    return "Hello, " + name + "! Welcome to EduRun!";
}

int addNumbers(int a, int b) {
    return a + b;
}

int main() {
    cout << greetStudent("Coder") << endl;
    cout << "5 + 3 = " << addNumbers(5, 3) << endl;
    return 0;
}"#;

/// Alternate spellings accepted for built-in languages.
const ALIASES: &[(&str, &str)] = &[("js", "javascript"), ("c++", "cpp"), ("py", "python")];

static BUILTIN: Lazy<LanguageRegistry> = Lazy::new(|| {
    LanguageRegistry::new(vec![
        LanguageDescriptor {
            id: "javascript".to_string(),
            display_name: "JavaScript".to_string(),
            file_extension: "js".to_string(),
            starter_template: JAVASCRIPT_TEMPLATE.to_string(),
            backend_id: "javascript".to_string(),
        },
        LanguageDescriptor {
            id: "python".to_string(),
            display_name: "Python".to_string(),
            file_extension: "py".to_string(),
            starter_template: PYTHON_TEMPLATE.to_string(),
            backend_id: "python".to_string(),
        },
        LanguageDescriptor {
            id: "cpp".to_string(),
            display_name: "C++".to_string(),
            file_extension: "cpp".to_string(),
            starter_template: CPP_TEMPLATE.to_string(),
            backend_id: "cpp".to_string(),
        },
    ])
});

/// Immutable lookup table of known languages.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    languages: Vec<LanguageDescriptor>,
}

impl LanguageRegistry {
    /// Creates a registry over the given descriptors.
    #[must_use]
    pub fn new(languages: Vec<LanguageDescriptor>) -> Self {
        Self { languages }
    }

    /// The process-wide registry of built-in languages.
    #[must_use]
    pub fn builtin() -> &'static Self {
        &BUILTIN
    }

    /// Resolves an editor identifier, case-insensitively and through aliases.
    ///
    /// Unknown identifiers resolve to [`LanguageDescriptor::passthrough`].
    #[must_use]
    pub fn resolve(&self, id: &str) -> LanguageDescriptor {
        self.find(id)
            .cloned()
            .unwrap_or_else(|| LanguageDescriptor::passthrough(id))
    }

    /// Looks up a known language without the pass-through default.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&LanguageDescriptor> {
        let id = id.trim().to_lowercase();
        let canonical = ALIASES
            .iter()
            .find(|(alias, _)| *alias == id)
            .map_or(id.as_str(), |(_, target)| *target);
        self.languages.iter().find(|lang| lang.id == canonical)
    }

    /// Finds the language whose file extension matches, case-insensitively.
    #[must_use]
    pub fn from_extension(&self, ext: &str) -> Option<&LanguageDescriptor> {
        let ext = ext.to_lowercase();
        let ext = match ext.as_str() {
            "mjs" | "cjs" => "js",
            "cc" | "cxx" | "hpp" => "cpp",
            other => other,
        };
        self.languages.iter().find(|lang| lang.file_extension == ext)
    }

    /// Finds the language of a file from its extension.
    #[must_use]
    pub fn from_path(&self, path: &Path) -> Option<&LanguageDescriptor> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.from_extension(ext))
    }

    /// All known languages in registration order.
    #[must_use]
    pub fn all(&self) -> &[LanguageDescriptor] {
        &self.languages
    }
}
