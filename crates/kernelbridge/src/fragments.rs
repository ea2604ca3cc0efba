//! C++ fragments generated by the keywords.
//!
//! Everything the library sends to the kernel besides user code is built
//! here, so the shape of each generated fragment can be unit tested without
//! a kernel.

use std::path::{Path, PathBuf};

/// Name of the demangling helper defined at session start.
pub const DEMANGLE_HELPER: &str = "kernelbridge_demangle";

/// Defines [`DEMANGLE_HELPER`] in the session.
pub fn demangle_helper() -> String {
    format!(
        r#"std::string {DEMANGLE_HELPER}(const char* name) {{
    int status = 0;
    std::unique_ptr<char, void (*)(void*)> demangled(
        abi::__cxa_demangle(name, nullptr, nullptr, &status), std::free);
    return status == 0 && demangled ? std::string(demangled.get()) : std::string(name);
}}"#
    )
}

/// Appends one interpreter flag.
pub fn flag_magic(flag: &str) -> String {
    // JSON string quoting is valid Python string quoting for the magic.
    let quoted = serde_json::Value::String(flag.to_string());
    format!("%config Interpreter.flags += [{quoted}]")
}

/// Adds an include directory to the interpreter's search path.
pub fn include_dir_magic(dir: &Path) -> String {
    flag_magic(&format!("-I{}", dir.display()))
}

pub fn system_include(header: &str) -> String {
    format!("#include <{header}>")
}

pub fn local_include(path: &Path) -> String {
    format!("#include \"{}\"", path.display())
}

pub fn load_library(lib: &str) -> String {
    format!("%load_library {lib}")
}

/// Throws a runtime error carrying `signature` when `condition` is false.
///
/// The thrown message is `"<signature>: <condition>"`, optionally followed
/// by ` | Context: ` and the streamed value of `otherwise`.
pub fn assertion(condition: &str, otherwise: Option<&str>, signature: &str) -> String {
    let message = cpp_string_literal(&format!("{signature}: {condition}"));
    match otherwise {
        None => format!(
            "if (!({condition})) {{\n    throw std::runtime_error({message});\n}}"
        ),
        Some(context) => format!(
            "if (!({condition})) {{\n    std::ostringstream kernelbridge_msg;\n    \
             kernelbridge_msg << {message} << \" | Context: \" << ({context});\n    \
             throw std::runtime_error(kernelbridge_msg.str());\n}}"
        ),
    }
}

/// Prints the value of `expr` to stdout.
pub fn print(expr: &str) -> String {
    format!("std::cout << ({expr});")
}

/// Calls `func` with `params` and prints the result.
pub fn call(func: &str, params: &[impl AsRef<str>]) -> String {
    let args: Vec<&str> = params.iter().map(AsRef::as_ref).collect();
    format!("std::cout << {func}({});", args.join(", "))
}

/// Prints the implementation's type tag of `expr`.
pub fn typeid(expr: &str) -> String {
    format!("std::cout << typeid({expr}).name();")
}

/// Prints the demangled type name of `expr`.
pub fn typename(expr: &str) -> String {
    format!("std::cout << {DEMANGLE_HELPER}(typeid({expr}).name());")
}

/// Quotes `text` as a C++ string literal.
pub fn cpp_string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Finds `file` locally or in the first include directory that has it.
///
/// Absolute paths and files that exist relative to the working directory
/// are returned as given; an unresolvable file is returned unchanged and
/// left for the kernel to report.
pub fn resolve_include(file: &str, include_paths: &[PathBuf]) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() || path.exists() {
        return path.to_path_buf();
    }
    include_paths
        .iter()
        .map(|dir| dir.join(path))
        .find(|candidate| candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test]
    fn test_assertion_without_context() {
        let code = assertion("1 == 0", None, "AssertionError");
        assert_eq!(
            code,
            "if (!(1 == 0)) {\n    throw std::runtime_error(\"AssertionError: 1 == 0\");\n}"
        );
    }

    #[test]
    fn test_assertion_with_context() {
        let code = assertion("x > 0", Some("x"), "AssertionError");
        assert!(code.starts_with("if (!(x > 0)) {"));
        assert!(code.contains("<< \" | Context: \" << (x);"));
        assert!(code.contains("throw std::runtime_error(kernelbridge_msg.str());"));
    }

    #[test]
    fn test_assertion_escapes_condition_text() {
        let code = assertion(r#"s == "a""#, None, "AssertionError");
        assert!(code.contains(r#"std::runtime_error("AssertionError: s == \"a\"")"#));
    }

    #[test_case("-std=c++20", r#"%config Interpreter.flags += ["-std=c++20"]"# ; "plain flag")]
    #[test_case(r#"-DNAME="x""#, r#"%config Interpreter.flags += ["-DNAME=\"x\""]"# ; "quoted flag")]
    fn test_flag_magic(flag: &str, expected: &str) {
        assert_eq!(flag_magic(flag), expected);
    }

    #[test]
    fn test_include_dir_magic() {
        assert_eq!(
            include_dir_magic(Path::new("/opt/include")),
            r#"%config Interpreter.flags += ["-I/opt/include"]"#
        );
    }

    #[test]
    fn test_introspection_fragments() {
        assert_eq!(typeid("42"), "std::cout << typeid(42).name();");
        assert_eq!(
            typename("std::string(\"foo\")"),
            "std::cout << kernelbridge_demangle(typeid(std::string(\"foo\")).name());"
        );
        assert_eq!(print("x"), "std::cout << (x);");
        assert_eq!(call("add", &["1", "2"]), "std::cout << add(1, 2);");
        assert_eq!(call("now", &[] as &[&str]), "std::cout << now();");
    }

    #[test]
    fn test_demangle_helper_defines_named_function() {
        let helper = demangle_helper();
        assert!(helper.starts_with("std::string kernelbridge_demangle(const char* name) {"));
        assert!(helper.contains("abi::__cxa_demangle"));
    }

    #[test]
    fn test_resolve_include_searches_include_paths() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("widget.hpp"), "").unwrap();

        let resolved = resolve_include("widget.hpp", &[PathBuf::from("/nonexistent"), dir.path().to_path_buf()]);
        assert_eq!(resolved, dir.path().join("widget.hpp"));

        let missing = resolve_include("missing.hpp", &[dir.path().to_path_buf()]);
        assert_eq!(missing, PathBuf::from("missing.hpp"));
    }
}
