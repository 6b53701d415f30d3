//! Last-resort solutions for when generation is unavailable.
//!
//! A small static table of generic remediation steps, keyed by coarse
//! category, selected by keyword rules over the error text. The router
//! consults it only after the generation backend failed, timed out, or
//! returned nothing, so callers always get a non-empty answer.
//!
//! This is not a matcher for stored records; retrieval goes through the
//! similarity engine.

use serde::Serialize;

use crate::models::GeneratedSolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Configuration,
    Dependency,
    Build,
    Network,
    Permission,
}

struct Entry {
    category: Category,
    description: &'static str,
    solution_text: &'static str,
    confidence: f64,
}

const ENTRIES: &[Entry] = &[
    Entry {
        category: Category::Configuration,
        description: "Configuration Error: Missing environment variables",
        solution_text: "Check your environment variables:\n\
            1. Verify all required ENV vars are set\n\
            2. Check .env file syntax\n\
            3. Restart the application after changes",
        confidence: 0.9,
    },
    Entry {
        category: Category::Dependency,
        description: "Dependency Conflict: Package version mismatch",
        solution_text: "Resolve dependency conflicts:\n\
            1. Update package.json/requirements.txt\n\
            2. Clear cache (npm ci / pip install --force-reinstall)\n\
            3. Check for breaking changes in dependencies",
        confidence: 0.85,
    },
    Entry {
        category: Category::Build,
        description: "Build Error: Compilation failure",
        solution_text: "Fix build issues:\n\
            1. Check for syntax errors in code\n\
            2. Verify all imports are correct\n\
            3. Ensure build tools are properly configured",
        confidence: 0.8,
    },
    Entry {
        category: Category::Network,
        description: "Network Error: Connection timeout",
        solution_text: "Network connectivity issues:\n\
            1. Check firewall settings\n\
            2. Verify network configuration\n\
            3. Test connectivity to external services",
        confidence: 0.75,
    },
    Entry {
        category: Category::Permission,
        description: "Permission Error: Access denied",
        solution_text: "Permission problems:\n\
            1. Check file/directory permissions\n\
            2. Verify user has required access\n\
            3. Check SELinux/AppArmor policies if applicable",
        confidence: 0.7,
    },
];

struct Rule {
    keywords: &'static [&'static str],
    order: &'static [Category],
}

// First matching rule wins.
const RULES: &[Rule] = &[
    Rule {
        keywords: &["permission", "denied", "eacces", "eperm", "forbidden", "unauthorized"],
        order: &[Category::Permission, Category::Configuration, Category::Network],
    },
    Rule {
        keywords: &["docker", "container", "dockerfile", "image"],
        order: &[Category::Build, Category::Permission, Category::Network],
    },
    Rule {
        keywords: &[
            "npm", "node", "yarn", "pip", "package", "dependency", "dependencies", "module",
            "import", "cargo", "maven", "gradle",
        ],
        order: &[Category::Dependency, Category::Build, Category::Configuration],
    },
    Rule {
        keywords: &[
            "timeout", "timed out", "connection", "econnrefused", "econnreset", "unreachable",
            "dns", "ssl", "tls",
        ],
        order: &[Category::Network, Category::Configuration, Category::Permission],
    },
    Rule {
        keywords: &["compile", "compilation", "syntax", "build"],
        order: &[Category::Build, Category::Dependency, Category::Configuration],
    },
];

const DEFAULT_ORDER: &[Category] = &[
    Category::Configuration,
    Category::Dependency,
    Category::Build,
];

/// Categories selected for `error_text`, most relevant first.
pub fn categorize(error_text: &str) -> &'static [Category] {
    let lower = error_text.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| lower.contains(k)))
        .map(|rule| rule.order)
        .unwrap_or(DEFAULT_ORDER)
}

/// Generic solutions for `error_text`. Never empty.
pub fn fallback_solutions(error_text: &str) -> Vec<GeneratedSolution> {
    categorize(error_text)
        .iter()
        .filter_map(|cat| ENTRIES.iter().find(|e| e.category == *cat))
        .map(|e| GeneratedSolution {
            description: e.description.to_string(),
            solution_text: e.solution_text.to_string(),
            confidence: e.confidence,
        })
        .collect()
}
