//! The `os` module. Fixed descriptors; nothing is read from the host.

use crate::js::{sync_fn, Interpreter, Obj, Value};

const DESCRIPTORS: [(&str, &str); 6] = [
    ("platform", "browser"),
    ("type", "Browser"),
    ("arch", "x64"),
    ("hostname", "localhost"),
    ("tmpdir", "/tmp"),
    ("homedir", "/home/user"),
];

pub fn module(interp: &Interpreter) -> Obj {
    let os = interp.new_object();
    for (name, value) in DESCRIPTORS {
        interp.define_method(&os, name, sync_fn(move |_, _, _| Ok(Value::from(value))));
    }
    os.set_own("EOL", Value::from("\n"));
    os
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js::{parse, Options};

    #[tokio::test]
    async fn descriptors() {
        let interp = Interpreter::new(Options::default());
        interp.define_global("os", module(&interp));
        let program = parse("[os.platform(), os.type(), os.arch(), os.tmpdir(), os.EOL === '\\n'].join(',')").unwrap();
        let value = interp.run_script(&program).await.unwrap();
        assert_eq!(value.to_display_string(), "browser,Browser,x64,/tmp,true");
    }
}
