//! runtime::console
//!
//! Output channels of executed code.
//!
//! Script `console` calls are formatted here and handed to a [`Console`]:
//! [`StdConsole`] for the CLI, [`CapturedConsole`] for tests and embedding.

use std::sync::{Arc, Mutex};

use crate::js::builtins::json;
use crate::js::{native_fn, Interpreter, JsResult, Obj, Value};

/// Which channel a line was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Log,
    Error,
}

/// Receiver of console output.
pub trait Console: Send + Sync {
    fn write(&self, stream: Stream, text: &str);
}

/// Keeps every line, in order.
#[derive(Debug, Clone, Default)]
pub struct CapturedConsole {
    lines: Arc<Mutex<Vec<(Stream, String)>>>,
}

impl CapturedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every line written so far, with its channel.
    pub fn lines(&self) -> Vec<(Stream, String)> {
        self.lines
            .lock()
            .map(|l| l.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Lines written to one channel.
    pub fn output(&self, stream: Stream) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, line)| line)
            .collect()
    }

    pub fn clear(&self) {
        match self.lines.lock() {
            Ok(mut l) => l.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl Console for CapturedConsole {
    fn write(&self, stream: Stream, text: &str) {
        match self.lines.lock() {
            Ok(mut l) => l.push((stream, text.to_string())),
            Err(poisoned) => poisoned.into_inner().push((stream, text.to_string())),
        }
    }
}

/// Log lines to stdout, errors to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn write(&self, stream: Stream, text: &str) {
        match stream {
            Stream::Log => println!("{text}"),
            Stream::Error => eprintln!("{text}"),
        }
    }
}

/// Render `console.log` arguments: objects as two-space JSON, errors as
/// `Name: message`, everything else by string conversion; joined by spaces.
pub async fn format_values(interp: &Interpreter, args: &[Value]) -> JsResult<String> {
    let mut parts = Vec::with_capacity(args.len());
    for value in args {
        let part = match value {
            Value::Object(obj) if obj.is_error() || obj.is_callable() => value.to_display_string(),
            Value::Object(_) => match json::stringify(interp, value, Some("  ")).await {
                Ok(Some(text)) => text,
                Ok(None) => value.to_display_string(),
                Err(_) => "[Circular]".to_string(),
            },
            other => interp.to_string(other).await?,
        };
        parts.push(part);
    }
    Ok(parts.join(" "))
}

/// Build the script-side `console` object writing to `sink`.
pub fn console_object(interp: &Interpreter, sink: Arc<dyn Console>) -> Obj {
    let console = interp.new_object();
    let methods: [(&str, Stream, &str); 5] = [
        ("log", Stream::Log, ""),
        ("debug", Stream::Log, ""),
        ("info", Stream::Log, "ℹ️ "),
        ("warn", Stream::Log, "⚠️ "),
        ("error", Stream::Error, ""),
    ];
    for (name, stream, prefix) in methods {
        let sink = sink.clone();
        interp.define_method(
            &console,
            name,
            native_fn(move |interp, _, args| {
                let sink = sink.clone();
                Box::pin(async move {
                    let text = format_values(interp, &args).await?;
                    sink.write(stream, &format!("{prefix}{text}"));
                    Ok(Value::Undefined)
                })
            }),
        );
    }
    console
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::{parse, Options};

    async fn run(source: &str) -> CapturedConsole {
        let captured = CapturedConsole::new();
        let interp = Interpreter::new(Options::default());
        interp.define_global("console", console_object(&interp, Arc::new(captured.clone())));
        let program = parse(source).unwrap();
        interp.run_script(&program).await.unwrap();
        captured
    }

    #[tokio::test]
    async fn primitives_join_with_spaces() {
        let out = run("console.log('a', 1, true, null, undefined)").await;
        assert_eq!(out.output(Stream::Log), vec!["a 1 true null undefined"]);
    }

    #[tokio::test]
    async fn objects_render_as_pretty_json() {
        let out = run("console.log('v:', { a: [1] })").await;
        assert_eq!(out.output(Stream::Log), vec!["v: {\n  \"a\": [\n    1\n  ]\n}"]);
    }

    #[tokio::test]
    async fn channels_and_prefixes() {
        let out = run("console.warn('careful'); console.info('fyi'); console.error(new TypeError('bad'))").await;
        assert_eq!(
            out.lines(),
            vec![
                (Stream::Log, "⚠️ careful".to_string()),
                (Stream::Log, "ℹ️ fyi".to_string()),
                (Stream::Error, "TypeError: bad".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn cycles_do_not_throw() {
        let out = run("const a = {}; a.a = a; console.log(a)").await;
        assert_eq!(out.output(Stream::Log), vec!["[Circular]"]);
    }
}
