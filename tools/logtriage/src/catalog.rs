use crate::errors::TriageError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Uncompiled rule as written in config files and audit suggestions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub pattern: String,
    pub name: String,
    pub description: String,
    pub recommendation: String,
}

#[derive(Debug, Clone)]
pub struct PatternRule {
    pub matcher: Regex,
    pub name: String,
    pub description: String,
    pub recommendation: String,
}

impl PatternRule {
    pub fn compile(definition: &RuleDefinition) -> Result<Self, TriageError> {
        let matcher = RegexBuilder::new(&definition.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| TriageError::InvalidPattern {
                name: definition.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            matcher,
            name: definition.name.clone(),
            description: definition.description.clone(),
            recommendation: definition.recommendation.clone(),
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }
}

#[derive(Debug, Clone)]
pub struct PatternCatalog {
    rules: Vec<PatternRule>,
}

impl PatternCatalog {
    /// The built-in rules in declared order.
    pub fn builtin() -> Result<Self, TriageError> {
        Self::from_definitions(&builtin_definitions())
    }

    pub fn from_definitions(definitions: &[RuleDefinition]) -> Result<Self, TriageError> {
        let rules = definitions
            .iter()
            .map(PatternRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Built-in rules followed by `extra` in the given order.
    pub fn extended(extra: &[RuleDefinition]) -> Result<Self, TriageError> {
        let mut catalog = Self::builtin()?;
        catalog.rules.extend(Self::from_definitions(extra)?.rules);
        Ok(catalog)
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn matching<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a PatternRule> + 'a {
        self.rules.iter().filter(move |rule| rule.matches(text))
    }

    pub fn any_match(&self, text: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(text))
    }
}

pub fn builtin_definitions() -> Vec<RuleDefinition> {
    BUILTIN_RULES
        .iter()
        .map(|(pattern, name, description, recommendation)| RuleDefinition {
            pattern: (*pattern).to_string(),
            name: (*name).to_string(),
            description: (*description).to_string(),
            recommendation: (*recommendation).to_string(),
        })
        .collect()
}

// (pattern, name, description, recommendation)
const BUILTIN_RULES: &[(&str, &str, &str, &str)] = &[
    // CI environment
    (
        r"sh: 1: husky: not found",
        "Husky Not Found",
        "Husky git hooks are failing in CI environment",
        "Run disable-husky-in-ci.js in the prepare step or use skipCI in .huskyrc",
    ),
    (
        r"ENOSPC: no space left on device",
        "Disk Space Error",
        "CI runner has run out of disk space",
        "Clean up artifacts or increase disk space allocation in CI",
    ),
    // UI framework migration
    (
        r"ERR! Cannot read properties of undefined \(reading 'root'\)",
        "Angular Router Error",
        "Router configuration error in Angular tests",
        "Check TestBed configuration and route declarations in test files",
    ),
    (
        r"No provider for Nb\w+Service",
        "Missing Nebular Provider",
        "Nebular service provider not found in test setup",
        "Add required Nebular service to TestBed providers array and import NbThemeModule",
    ),
    (
        r"NbThemeModule.*has been already loaded",
        "Duplicate Theme Module",
        "NbThemeModule loaded multiple times",
        "Import NbThemeModule.forRoot() only in AppModule, use NbThemeModule in feature modules",
    ),
    // Style sheets
    (
        r"@import.*is deprecated",
        "SCSS Deprecation Warning",
        "Using deprecated @import in SCSS files",
        "Replace @import with @use/@forward in SCSS files",
    ),
    (
        r"darken\(\).*function is deprecated",
        "SCSS Function Deprecation",
        "Using deprecated SCSS color functions",
        "Use color.scale() or color.adjust() instead",
    ),
    (
        r"/\s+in\s+SCSS\s+will\s+be\s+removed",
        "SCSS Division Deprecation",
        "Using deprecated / for division in SCSS",
        "Use math.div() function instead",
    ),
    // Test harness
    (
        r"HttpTestingController.*found (none|multiple)",
        "HTTP Test Error",
        "HttpTestingController expectations not met",
        "Check HTTP mock setup in tests and ensure expectations match actual requests",
    ),
    (
        r"zone(-microtask)?\.js.*has been loaded",
        "Zone.js Loading Error",
        "Zone.js loaded multiple times or in wrong order",
        "Ensure Zone.js is imported only once in polyfills.ts before other imports",
    ),
    (
        r"component.*is not a known element",
        "Unknown Component Error",
        "Component not declared in module or standalone imports",
        "Add component to module declarations or standalone imports array",
    ),
    // Dependency resolution
    (
        r"Cannot find module 'angularx-qrcode'",
        "Missing QR Code Module",
        "Angular QR Code module not found",
        "Run npm install angularx-qrcode in client-angular directory",
    ),
    (
        r"@nebular/theme.*peer dep.*@angular/core",
        "Nebular Peer Dependency",
        "Nebular and Angular version mismatch",
        "Ensure @nebular/theme version matches your Angular version",
    ),
    (
        r"package.json.*has incorrect peer dependency",
        "Incorrect Peer Dependencies",
        "Package peer dependency version mismatch",
        "Update package versions to match peer dependency requirements",
    ),
    // Type checking
    (
        r"Type.*is not assignable to type",
        "TypeScript Type Error",
        "Type mismatch in TypeScript code",
        "Check type definitions and ensure proper type usage",
    ),
    (
        r"Cannot find name 'NbThemeService'",
        "Missing Nebular Import",
        "Nebular service or type not imported",
        "Import required Nebular services/types from @nebular/theme",
    ),
    (
        r"standalone.*cannot be resolved",
        "Standalone Component Error",
        "Issues with standalone component configuration",
        "Check standalone component imports and ensure Angular version supports standalone components",
    ),
    // Datastore connectivity
    (
        r"MongoServerError.*failed to connect",
        "MongoDB Connection Error",
        "Failed to connect to MongoDB server",
        "Check if MongoDB is running and connection string is correct",
    ),
    (
        r"MongoServerError.*duplicate key error",
        "MongoDB Duplicate Key",
        "Attempted to insert duplicate unique key",
        "Ensure unique indexes are properly configured and handle duplicate key errors",
    ),
    // Package manager and Node runtime
    (
        r"npm ERR! code E404",
        "Package Not Found",
        "A package dependency could not be found in the npm registry",
        "Check package.json for typos in package names or update to available versions",
    ),
    (
        r"npm ERR! code ENOENT",
        "File Not Found",
        "npm could not find a file it was looking for",
        "Check file paths and ensure all required files exist",
    ),
    (
        r"npm ERR! code ETIMEDOUT",
        "Connection Timeout",
        "Connection to npm registry timed out",
        "This is likely a temporary network issue. Retry the workflow.",
    ),
    (
        r"npm ERR! code ELIFECYCLE",
        "Lifecycle Script Error",
        "A npm script in package.json failed to execute",
        "Check the error message for details on which script failed and why",
    ),
    (
        r"Error: Cannot find module",
        "Module Not Found",
        "A required Node.js module could not be found",
        "Ensure the module is listed in dependencies or devDependencies and run npm install",
    ),
    (
        r"FATAL ERROR: Reached heap limit",
        "Memory Limit Exceeded",
        "The Node.js process ran out of memory",
        "Optimize memory usage or increase memory limit with NODE_OPTIONS=\"--max-old-space-size=4096\"",
    ),
    (
        r"error TS\d+:",
        "TypeScript Compiler Error",
        "TypeScript compilation failed",
        "Fix the TypeScript errors reported in the logs",
    ),
    (
        r"error Unexpected token",
        "JavaScript Syntax Error",
        "There is a syntax error in JavaScript code",
        "Fix the syntax error reported in the logs",
    ),
];
