//! Variable substituter (spec §4.2): expands `${...}` references against a
//! scoped binding tree. Grounded on `vwf-core::render::render_template`'s
//! regex scan-and-splice technique, generalized from `{{var}}` to `${...}`
//! and from error-on-miss to leave-untouched-on-miss.

use bioflow_types::Value;
use regex::Regex;
use std::sync::OnceLock;

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([a-zA-Z0-9_.\-]+)\}").unwrap())
}

/// Bindings available to a single step's substitution pass: `config`,
/// `inputs`, `resources`, `steps`, and `run_dir` (spec §4.2).
pub struct Bindings {
    root: Value,
}

impl Bindings {
    pub fn new() -> Self {
        Self { root: Value::map() }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.root.insert("config", config);
        self
    }

    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.root.insert("inputs", inputs);
        self
    }

    pub fn with_resources(mut self, resources: Value) -> Self {
        self.root.insert("resources", resources);
        self
    }

    pub fn with_steps(mut self, steps: Value) -> Self {
        self.root.insert("steps", steps);
        self
    }

    pub fn with_run_dir(mut self, run_dir: impl Into<String>) -> Self {
        self.root.insert("run_dir", Value::Str(run_dir.into()));
        self
    }
}

impl Default for Bindings {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand every `${...}` reference in `template` against `bindings`.
///
/// Substitution is single-pass, left-to-right, non-recursive: a substituted
/// value is never itself re-scanned for further references. A reference
/// that does not resolve (unknown key, wrong shape) is left as literal text
/// — this matches the source's forgiving behaviour and lets shell-side
/// `$var` syntax coexist untouched.
pub fn substitute(template: &str, bindings: &Bindings) -> String {
    let re = pattern();
    let mut out = String::with_capacity(template.len());
    let mut last = 0usize;

    for cap in re.captures_iter(template) {
        let whole = cap.get(0).unwrap();
        let path = cap.get(1).unwrap().as_str();
        out.push_str(&template[last..whole.start()]);

        // `run_dir` has no sub-path; everything else is `<scope>.<path...>`.
        let resolved = bindings.root.get_path(path).and_then(Value::as_literal);
        match resolved {
            Some(v) => out.push_str(&v),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_all_reference_kinds() {
        let mut config = Value::map();
        config.insert("genome", Value::from("GRCh38"));
        let mut inputs = Value::map();
        inputs.insert("sample", Value::from("S01"));
        let mut resources = Value::map();
        resources.insert("cpu", Value::from(4i64));
        let mut steps = Value::map();
        let mut align = Value::map();
        let mut outputs = Value::map();
        outputs.insert("bam", Value::from("align/out.bam"));
        align.insert("outputs", outputs);
        steps.insert("align", align);

        let bindings = Bindings::new()
            .with_config(config)
            .with_inputs(inputs)
            .with_resources(resources)
            .with_steps(steps)
            .with_run_dir("/runs/20260101_000000_abcd1234");

        let out = substitute(
            "ref=${config.genome} sample=${inputs.sample} cpu=${resources.cpu} bam=${steps.align.outputs.bam} dir=${run_dir}",
            &bindings,
        );
        assert_eq!(
            out,
            "ref=GRCh38 sample=S01 cpu=4 bam=align/out.bam dir=/runs/20260101_000000_abcd1234"
        );
    }

    #[test]
    fn unresolved_reference_is_left_untouched() {
        let bindings = Bindings::new();
        let out = substitute("echo $HOME ${inputs.missing} ${steps.nope.outputs.x}", &bindings);
        assert_eq!(out, "echo $HOME ${inputs.missing} ${steps.nope.outputs.x}");
    }

    #[test]
    fn idempotent_without_placeholders() {
        let bindings = Bindings::new();
        let s = "plain command --flag value";
        assert_eq!(substitute(s, &bindings), s);
    }

    #[test]
    fn substitution_is_single_pass_not_recursive() {
        let mut inputs = Value::map();
        inputs.insert("nested", Value::from("${inputs.inner}"));
        let bindings = Bindings::new().with_inputs(inputs);
        // The substituted text contains a `${...}` sequence but it must not
        // be re-scanned.
        assert_eq!(substitute("${inputs.nested}", &bindings), "${inputs.inner}");
    }
}
