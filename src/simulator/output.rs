//! Output capture for print-like statements

use super::patterns::{split_top_level, wraps_whole};
use super::values::{self, format_number, Operand};
use super::LineSimulator;
use crate::snapshot::{OutputEntry, Stream};
use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    /// Arguments joined by spaces, then a newline
    Line,
    /// Arguments joined by spaces, no newline
    Plain,
    /// First argument is a format string
    Format,
    /// Format string, then a newline
    FormatLine,
    /// PHP `echo` with `.` concatenation
    Echo,
    /// C++ `cout << a << b`
    Insertion,
}

struct Printer {
    pattern: Regex,
    style: Style,
    stream: Stream,
}

static PRINTERS: Lazy<Vec<Printer>> = Lazy::new(|| {
    use Stream::{Stderr, Stdout};
    use Style::*;
    let table: &[(&str, Style, Stream)] = &[
        (r"^console\.(?:log|info|debug)\s*\((.*)\)$", Line, Stdout),
        (r"^console\.(?:error|warn)\s*\((.*)\)$", Line, Stderr),
        (r"^System\.out\.println\s*\((.*)\)$", Line, Stdout),
        (r"^System\.out\.print\s*\((.*)\)$", Plain, Stdout),
        (r"^System\.out\.printf\s*\((.*)\)$", Format, Stdout),
        (r"^System\.err\.println\s*\((.*)\)$", Line, Stderr),
        (r"^Console\.WriteLine\s*\((.*)\)$", FormatLine, Stdout),
        (r"^Console\.Write\s*\((.*)\)$", Format, Stdout),
        (r"^fmt\.Println\s*\((.*)\)$", Line, Stdout),
        (r"^fmt\.Print\s*\((.*)\)$", Plain, Stdout),
        (r"^fmt\.Printf\s*\((.*)\)$", Format, Stdout),
        (r"^println!\s*\((.*)\)$", FormatLine, Stdout),
        (r"^print!\s*\((.*)\)$", Format, Stdout),
        (r"^eprintln!\s*\((.*)\)$", FormatLine, Stderr),
        (r"^printf\s*\((.*)\)$", Format, Stdout),
        (r"^println\s*\((.*)\)$", Line, Stdout),
        (r"^print\s*\((.*)\)$", Line, Stdout),
        (r"^puts\s*\((.*)\)$", Line, Stdout),
        (r"^echo\s+(.*)$", Echo, Stdout),
        (r"^(?:std::)?cout\s*<<\s*(.*)$", Insertion, Stdout),
        (r"^(?:std::)?cerr\s*<<\s*(.*)$", Insertion, Stderr),
    ];
    table
        .iter()
        .filter_map(|(pattern, style, stream)| {
            Regex::new(pattern).ok().map(|pattern| Printer {
                pattern,
                style: *style,
                stream: *stream,
            })
        })
        .collect()
});

static PLACEHOLDER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"%%|%(\.\d+)?l?[dfisvcu]|\{(\d*)(?::\?)?\}").ok());

/// The output a print-like statement would produce, if `stmt` is one
pub(super) fn capture(sim: &LineSimulator, stmt: &str, line: usize) -> Option<OutputEntry> {
    let (printer, args) = PRINTERS.iter().find_map(|p| {
        let caps = p.pattern.captures(stmt)?;
        Some((p, caps.get(1).map_or("", |m| m.as_str()).to_string()))
    })?;
    // `print(a)(b)` and `print(a) + x` are not plain prints
    if matches!(printer.style, Style::Line | Style::Plain | Style::Format | Style::FormatLine) {
        let open = stmt.find('(')?;
        if !wraps_whole(&stmt[open..], '(', ')') {
            return None;
        }
    }

    let args = split_top_level(&args, ',');
    let text = match printer.style {
        Style::Line => joined(sim, &args) + "\n",
        Style::Plain => joined(sim, &args),
        Style::Format => formatted(sim, &args),
        Style::FormatLine => formatted(sim, &args) + "\n",
        Style::Echo => args
            .iter()
            .flat_map(|a| a.split(" . "))
            .map(|part| render(sim, part))
            .collect(),
        Style::Insertion => stmt_insertion(sim, &args.join(", ")),
    };
    Some(OutputEntry {
        stream: printer.stream,
        text,
        line: Some(line),
    })
}

fn joined(sim: &LineSimulator, args: &[String]) -> String {
    args.iter().map(|a| render(sim, a)).collect::<Vec<_>>().join(" ")
}

fn formatted(sim: &LineSimulator, args: &[String]) -> String {
    let Some(first) = args.first() else {
        return String::new();
    };
    let template = match values::evaluate(first, sim) {
        Some(Operand::Text(t)) => t,
        _ => return joined(sim, args),
    };
    let rest: Vec<Operand> = args[1..]
        .iter()
        .map(|a| values::evaluate(a, sim).unwrap_or_else(|| Operand::Raw(a.clone())))
        .collect();
    let Some(placeholder) = PLACEHOLDER.as_ref() else {
        return template;
    };

    let mut next = 0;
    placeholder
        .replace_all(&template, |caps: &regex::Captures| {
            if &caps[0] == "%%" {
                return "%".to_string();
            }
            let arg = match caps.get(2).filter(|m| !m.as_str().is_empty()) {
                Some(pos) => pos.as_str().parse::<usize>().ok().and_then(|i| rest.get(i)),
                None => {
                    next += 1;
                    rest.get(next - 1)
                }
            };
            let Some(arg) = arg else {
                return caps[0].to_string();
            };
            match (caps.get(1), arg.as_number()) {
                (Some(precision), Some(n)) => {
                    let digits = precision.as_str()[1..].parse::<usize>().unwrap_or(6);
                    format!("{:.*}", digits, n)
                }
                _ => render_operand(sim, arg),
            }
        })
        .into_owned()
}

fn stmt_insertion(sim: &LineSimulator, chain: &str) -> String {
    chain
        .split("<<")
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part {
            "endl" | "std::endl" => "\n".to_string(),
            other => render(sim, other),
        })
        .collect()
}

fn render(sim: &LineSimulator, arg: &str) -> String {
    match values::evaluate(arg, sim) {
        Some(op) => render_operand(sim, &op),
        None => arg.trim().to_string(),
    }
}

/// Printed form of a value; arrays print their elements
fn render_operand(sim: &LineSimulator, op: &Operand) -> String {
    let Operand::Ref(id) = op else {
        return op.printed();
    };
    let Some(obj) = sim.heap.iter().find(|o| &o.id == id) else {
        return id.clone();
    };
    let items: Vec<String> = obj
        .properties
        .iter()
        .map(|p| {
            let value = values::parse_scalar(&p.value)
                .map(|v| match v {
                    Operand::Number(n) => format_number(n),
                    other => other.display(),
                })
                .unwrap_or_else(|| p.value.clone());
            if obj.class_name == "Array" {
                value
            } else {
                format!("{}: {}", p.name, value)
            }
        })
        .collect();
    match obj.class_name.as_str() {
        "Array" => format!("[{}]", items.join(", ")),
        "Object" => format!("{{{}}}", items.join(", ")),
        other => format!("{} {{{}}}", other, items.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;

    fn printed(source: &str, language: Language) -> Vec<String> {
        let mut sim = LineSimulator::new(source, language);
        (0..sim.line_count())
            .flat_map(|i| sim.advance(i).output)
            .map(|e| e.text)
            .collect()
    }

    #[test]
    fn test_console_log_joins_arguments() {
        let out = printed("let x = 2;\nconsole.log(\"x is\", x + 1);", Language::JavaScript);
        assert_eq!(out, vec!["x is 3\n"]);
    }

    #[test]
    fn test_printf_substitutes() {
        let out = printed("int n = 4;\nprintf(\"n=%d, half=%.2f\\n\", n, 2.5);", Language::C);
        assert_eq!(out, vec!["n=4, half=2.50\n"]);
    }

    #[test]
    fn test_rust_println_braces() {
        let out = printed("let v = vec![1, 2];\nprintln!(\"{} {:?}\", 7, v);", Language::Rust);
        assert_eq!(out, vec!["7 [1, 2]\n"]);
    }

    #[test]
    fn test_cout_chain() {
        let out = printed("int a = 5;\nstd::cout << \"a=\" << a << std::endl;", Language::Cpp);
        assert_eq!(out, vec!["a=5\n"]);
    }

    #[test]
    fn test_stderr_stream() {
        let mut sim = LineSimulator::new("console.error(\"bad\")", Language::JavaScript);
        let step = sim.advance(0);
        assert_eq!(step.output[0].stream, Stream::Stderr);
    }
}
