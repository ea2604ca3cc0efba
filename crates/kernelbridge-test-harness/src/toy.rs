//! A toy interpreter for the C++ fragments the bridge generates.
//!
//! It understands just enough to drive the keyword library: integer and
//! string declarations, `std::cout << ...` chains, `typeid` and the demangle
//! helper, the generated assertion block, `throw`, includes and magics.
//! Diagnostics mimic clang-repl under xeus-cpp with libc++.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::Reply;

const STRING_TAG: &str = "NSt3__112basic_stringIcNS_11char_traitsIcEENS_9allocatorIcEEEE";
const STRING_NAME: &str =
    "std::__1::basic_string<char, std::__1::char_traits<char>, std::__1::allocator<char>>";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Int(i64),
    Str(String),
}

/// Stateful toy interpreter; variables persist across fragments.
#[derive(Debug, Default)]
pub struct ToyCpp {
    vars: HashMap<String, Value>,
    hang: Duration,
    line: usize,
}

impl ToyCpp {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long a `while (true)` fragment keeps the kernel busy.
    pub fn with_hang(mut self, hang: Duration) -> Self {
        self.hang = hang;
        self
    }

    /// Turns the interpreter into a [`FakeKernel`](crate::FakeKernel) handler.
    pub fn into_handler(mut self) -> impl FnMut(&str) -> Reply + Send + 'static {
        move |code: &str| self.handle(code)
    }

    /// Executes one fragment.
    pub fn handle(&mut self, code: &str) -> Reply {
        self.line += 1;
        let code = code.trim();

        if code.is_empty() || code.starts_with('%') || code.starts_with("#include <") {
            return Reply::ok();
        }
        if let Some(path) = code
            .strip_prefix("#include \"")
            .and_then(|r| r.strip_suffix('"'))
        {
            return if Path::new(path).exists() {
                Reply::ok()
            } else {
                self.fatal(&format!("'{path}' file not found"))
            };
        }
        if code.contains("while (true)") {
            return Reply::ok().delay(self.hang);
        }
        if code.starts_with("std::string kernelbridge_demangle(") {
            return Reply::ok();
        }
        if let Some(rest) = code.strip_prefix("if (!(") {
            return self.assertion(rest);
        }
        if let Some(message) = code
            .strip_prefix("throw std::runtime_error(\"")
            .and_then(|r| r.strip_suffix("\");"))
        {
            return Reply::ok().error("Standard Exception: ", message);
        }
        if let Some(chain) = code
            .strip_prefix("std::cout << ")
            .and_then(|r| r.strip_suffix(';'))
        {
            return match self.print(chain) {
                Ok(out) => Reply::ok().stdout(out),
                Err(diag) => self.compile_error(&diag),
            };
        }
        if let Some(decl) = code.strip_suffix(';') {
            return match self.declare(decl) {
                Ok(()) => Reply::ok(),
                Err(diag) => self.compile_error(&diag),
            };
        }

        Reply::ok()
    }

    fn assertion(&mut self, rest: &str) -> Reply {
        let Some((cond, _)) = rest.split_once(")) {") else {
            return self.compile_error("expected ')'");
        };
        match self.condition(cond) {
            Ok(true) => Reply::ok(),
            Ok(false) => Reply::ok().error(
                "Standard Exception: ",
                format!("AssertionError: {}", cond.trim()),
            ),
            Err(diag) => self.compile_error(&diag),
        }
    }

    fn declare(&mut self, decl: &str) -> Result<(), String> {
        let (lhs, rhs) = decl
            .split_once('=')
            .ok_or_else(|| "expected '=' in declaration".to_string())?;
        let mut words = lhs.split_whitespace();
        let (Some(ty), Some(name), None) = (words.next(), words.next(), words.next()) else {
            return Err("expected declaration".to_string());
        };

        let value = match ty {
            "int" | "long" | "auto" => Value::Int(self.int(rhs)?),
            "std::string" => Value::Str(string_literal(rhs.trim()).ok_or("expected string literal")?),
            other => return Err(format!("unknown type name '{other}'")),
        };
        self.vars.insert(name.to_string(), value);
        Ok(())
    }

    fn print(&self, chain: &str) -> Result<String, String> {
        let mut out = String::new();
        for part in chain.split(" << ") {
            let part = part.trim();
            if part == "std::endl" {
                out.push('\n');
            } else if let Some(text) = string_literal(part) {
                out.push_str(&text);
            } else if let Some(inner) = part
                .strip_prefix("kernelbridge_demangle(typeid(")
                .and_then(|r| r.strip_suffix(").name())"))
            {
                out.push_str(self.type_of(inner)?.1);
            } else if let Some(inner) = part
                .strip_prefix("typeid(")
                .and_then(|r| r.strip_suffix(").name()"))
            {
                out.push_str(self.type_of(inner)?.0);
            } else {
                match self.value(part)? {
                    Value::Int(n) => out.push_str(&n.to_string()),
                    Value::Str(s) => out.push_str(&s),
                }
            }
        }
        Ok(out)
    }

    /// Returns the mangled tag and the demangled name.
    fn type_of(&self, expr: &str) -> Result<(&'static str, &'static str), String> {
        let expr = expr.trim();
        if expr.starts_with("std::string(") {
            return Ok((STRING_TAG, STRING_NAME));
        }
        match self.value(expr)? {
            Value::Int(_) => Ok(("i", "int")),
            Value::Str(_) => Ok((STRING_TAG, STRING_NAME)),
        }
    }

    fn condition(&self, cond: &str) -> Result<bool, String> {
        match cond.trim() {
            "true" => return Ok(true),
            "false" => return Ok(false),
            _ => {}
        }
        for op in [" == ", " != ", " <= ", " >= ", " < ", " > "] {
            if let Some((lhs, rhs)) = cond.split_once(op) {
                let (a, b) = (self.int(lhs)?, self.int(rhs)?);
                return Ok(match op.trim() {
                    "==" => a == b,
                    "!=" => a != b,
                    "<=" => a <= b,
                    ">=" => a >= b,
                    "<" => a < b,
                    _ => a > b,
                });
            }
        }
        Err("expected expression".to_string())
    }

    fn int(&self, expr: &str) -> Result<i64, String> {
        match self.value(expr)? {
            Value::Int(n) => Ok(n),
            Value::Str(_) => Err("invalid operands to binary expression".to_string()),
        }
    }

    fn value(&self, expr: &str) -> Result<Value, String> {
        let mut expr = expr.trim();
        while let Some(inner) = expr.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
            expr = inner.trim();
        }
        if expr.is_empty() {
            return Err("expected expression".to_string());
        }
        if let Ok(n) = expr.parse::<i64>() {
            return Ok(Value::Int(n));
        }
        for op in [" + ", " - ", " * "] {
            if let Some((lhs, rhs)) = expr.split_once(op) {
                let (a, b) = (self.int(lhs)?, self.int(rhs)?);
                return Ok(Value::Int(match op {
                    " + " => a + b,
                    " - " => a - b,
                    _ => a * b,
                }));
            }
        }
        self.vars
            .get(expr)
            .cloned()
            .ok_or_else(|| format!("use of undeclared identifier '{expr}'"))
    }

    fn compile_error(&self, diag: &str) -> Reply {
        let line = format!("input_line_{}:1:1: error: {diag}\n", self.line);
        Reply::ok()
            .stderr(line.clone())
            .error("Error", format!("Compilation error! {line}"))
    }

    fn fatal(&self, diag: &str) -> Reply {
        let line = format!("input_line_{}:1:10: fatal error: {diag}\n", self.line);
        Reply::ok()
            .stderr(line.clone())
            .error("Error", format!("Compilation error! {line}"))
    }
}

fn string_literal(expr: &str) -> Option<String> {
    let inner = expr.strip_prefix('"')?.strip_suffix('"')?;
    Some(inner.replace("\\\"", "\"").replace("\\\\", "\\"))
}
