/// GLSL dialect accepted by the active context.
///
/// Shader payloads are authored against GLSL ES 3.00 (WebGL2). Desktop core
/// profiles reject `#version 300 es`, so the directive is swapped before
/// compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlslDialect {
    Es300,
    Desktop330,
}

impl GlslDialect {
    pub fn version_directive(self) -> &'static str {
        match self {
            GlslDialect::Es300 => "#version 300 es",
            GlslDialect::Desktop330 => "#version 330 core",
        }
    }
}

/// Rewrites the leading `#version` directive for `dialect`.
///
/// Sources without a directive get one prepended. Everything after the first
/// directive is passed through untouched; `precision` qualifiers are legal
/// (and ignored) in GLSL 3.30 core.
pub fn prepare_source(source: &str, dialect: GlslDialect) -> String {
    if dialect == GlslDialect::Es300 && has_directive(source, dialect.version_directive()) {
        return source.to_string();
    }

    let mut prepared = String::with_capacity(source.len() + 32);
    prepared.push_str(dialect.version_directive());
    prepared.push('\n');

    let mut skipped_version = false;
    for line in source.lines() {
        if !skipped_version && line.trim_start().starts_with("#version") {
            skipped_version = true;
            continue;
        }
        prepared.push_str(line);
        prepared.push('\n');
    }
    prepared
}

fn has_directive(source: &str, directive: &str) -> bool {
    source
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .is_some_and(|line| line.split_whitespace().eq(directive.split_whitespace()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glsl::{SIZING_VERTEX_SHADER, SOLID};

    #[test]
    fn es_sources_pass_through_untouched() {
        assert_eq!(prepare_source(SOLID, GlslDialect::Es300), SOLID);
    }

    #[test]
    fn desktop_dialect_replaces_version_once() {
        let prepared = prepare_source(SIZING_VERTEX_SHADER, GlslDialect::Desktop330);
        assert!(prepared.starts_with("#version 330 core\n"));
        assert_eq!(prepared.matches("#version").count(), 1);
        assert!(prepared.contains("out vec2 v_patternUV;"));
    }

    #[test]
    fn missing_directive_is_prepended() {
        let source = "precision mediump float;\nvoid main() {}\n";
        let prepared = prepare_source(source, GlslDialect::Es300);
        assert!(prepared.starts_with("#version 300 es\nprecision mediump float;"));
    }
}
