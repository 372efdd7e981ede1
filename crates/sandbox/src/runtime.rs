//! Interpreter-specific launchers.
//!
//! A launcher loads the candidate, checks that the entry point exists, calls
//! it with `(input_path, output_path)` and serializes the returned table to
//! `result_path` as `{"columns": [...], "rows": [[...]]}`.
//!
//! Every launcher speaks the same exit-code protocol:
//! `0` ok, `2` syntax error, `3` entry point missing, `4` value returned is
//! not a table. Anything else is a runtime failure.

use crate::SandboxError;

pub(crate) const EXIT_SYNTAX: i32 = 2;
pub(crate) const EXIT_MISSING_ENTRY: i32 = 3;
pub(crate) const EXIT_NOT_A_TABLE: i32 = 4;

const PYTHON_LAUNCHER: &str = r#"import datetime
import importlib.util
import json
import math
import sys


def load(path):
    spec = importlib.util.spec_from_file_location("candidate", path)
    module = importlib.util.module_from_spec(spec)
    spec.loader.exec_module(module)
    return module


def iso(value):
    if (value.hour, value.minute, value.second, value.microsecond) == (0, 0, 0, 0):
        return value.strftime("%Y-%m-%d")
    return value.strftime("%Y-%m-%dT%H:%M:%S")


def cell(value):
    if value is None:
        return None
    if isinstance(value, bool):
        return int(value)
    if isinstance(value, int):
        return value
    if isinstance(value, float):
        return None if math.isnan(value) or math.isinf(value) else value
    if isinstance(value, str):
        return value
    if isinstance(value, datetime.datetime):
        # pandas Timestamp and NaT are datetime subclasses
        return None if value != value else iso(value)
    if isinstance(value, datetime.date):
        return value.isoformat()
    item = getattr(value, "item", None)
    if callable(item):
        try:
            return cell(item())
        except Exception:
            pass
    try:
        if value != value:
            return None
    except Exception:
        pass
    return str(value)


def as_table(result):
    if hasattr(result, "columns") and hasattr(result, "itertuples"):
        columns = [str(c) for c in result.columns]
        rows = [[cell(v) for v in row] for row in result.itertuples(index=False, name=None)]
        return columns, rows
    if isinstance(result, dict) and "columns" in result:
        rows = result.get("rows", result.get("data"))
        if isinstance(rows, list):
            return [str(c) for c in result["columns"]], [[cell(v) for v in row] for row in rows]
        return None
    if isinstance(result, list) and all(isinstance(r, dict) for r in result):
        columns = []
        for record in result:
            for key in record:
                if key not in columns:
                    columns.append(key)
        rows = [[cell(record.get(c)) for c in columns] for record in result]
        return [str(c) for c in columns], rows
    return None


def main():
    candidate, entry, result_path, source, output = sys.argv[1:6]
    try:
        module = load(candidate)
    except SyntaxError as exc:
        print(f"SyntaxError: {exc}", file=sys.stderr)
        return 2
    func = getattr(module, entry, None)
    if not callable(func):
        print(f"entry point '{entry}' is missing or not callable", file=sys.stderr)
        return 3
    result = func(source, output)
    table = as_table(result)
    if table is None:
        print(f"entry point returned {type(result).__name__}, expected a table", file=sys.stderr)
        return 4
    columns, rows = table
    with open(result_path, "w", encoding="utf-8") as fh:
        json.dump({"columns": columns, "rows": rows}, fh, allow_nan=False, default=str)
    return 0


if __name__ == "__main__":
    sys.exit(main())
"#;

// The entry function prints the table as JSON on stdout.
const SHELL_LAUNCHER: &str = r#"candidate="$1"
entry="$2"
result="$3"
shift 3
. "$candidate" || exit 2
if ! command -v "$entry" >/dev/null 2>&1; then
    echo "entry point '$entry' is missing" >&2
    exit 3
fi
"$entry" "$@" > "$result"
"#;

/// Interpreter family, chosen by candidate file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Runtime {
    Python,
    Shell,
}

impl Runtime {
    pub(crate) fn from_extension(extension: &str) -> Result<Self, SandboxError> {
        match extension {
            "py" => Ok(Runtime::Python),
            "sh" => Ok(Runtime::Shell),
            other => Err(SandboxError::UnsupportedRuntime(other.to_string())),
        }
    }

    pub(crate) fn launcher(self) -> (&'static str, &'static str) {
        match self {
            Runtime::Python => ("launcher.py", PYTHON_LAUNCHER),
            Runtime::Shell => ("launcher.sh", SHELL_LAUNCHER),
        }
    }

    /// Arguments for a compile-only check of `candidate`.
    pub(crate) fn syntax_check_args(self, candidate: &str) -> Vec<String> {
        match self {
            Runtime::Python => vec!["-m".into(), "py_compile".into(), candidate.into()],
            Runtime::Shell => vec!["-n".into(), candidate.into()],
        }
    }
}
