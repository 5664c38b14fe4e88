//! Integration tests for the sandbox runtime.
//!
//! Scripts run against an in-memory project; package retrieval goes to a
//! local mock CDN.

use std::sync::Arc;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pyxis::core::config::RuntimeSettings;
use pyxis::notify::{ChangeEvent, RecordingSink};
use pyxis::runtime::{CapturedConsole, NodeRuntime, Stream};
use pyxis::vfs::{LocalFs, MemoryFs};

struct Project {
    fs: MemoryFs,
    sink: RecordingSink,
    console: CapturedConsole,
}

impl Project {
    fn new(fs: MemoryFs) -> Self {
        Self {
            fs,
            sink: RecordingSink::new(),
            console: CapturedConsole::new(),
        }
    }

    fn runtime(&self, settings: RuntimeSettings) -> NodeRuntime {
        NodeRuntime::new(
            Arc::new(self.fs.clone()),
            Arc::new(self.sink.clone()),
            Arc::new(self.console.clone()),
            settings,
        )
        .unwrap()
    }

    fn offline(&self) -> NodeRuntime {
        self.runtime(RuntimeSettings {
            cdn_fallback: false,
            ..RuntimeSettings::default()
        })
    }
}

fn cdn_settings(server: &MockServer) -> RuntimeSettings {
    RuntimeSettings {
        cdn_endpoints: vec![server.uri()],
        ..RuntimeSettings::default()
    }
}

mod projects {
    use super::*;

    #[tokio::test]
    async fn multi_file_project() {
        let project = Project::new(MemoryFs::with_files([
            ("/package.json", r#"{"name": "demo", "version": "1.2.3"}"#),
            ("/src/index.js", "import { total } from './math'; import pkg from '../package.json';\nconsole.log(pkg.name, pkg.version, total([1, 2, 3]));"),
            ("/src/math/index.js", "export function total(xs) { return xs.reduce((a, b) => a + b, 0); }"),
        ]));
        let result = project.offline().execute_file("src/index.js").await;

        assert!(result.success, "{result:?}");
        assert_eq!(
            project.console.output(Stream::Log),
            vec!["Executing: src/index.js", "demo 1.2.3 6"]
        );
    }

    #[tokio::test]
    async fn node_modules_before_project_root() {
        let project = Project::new(MemoryFs::with_files([
            ("/node_modules/shout/index.js", "module.exports = s => s.toUpperCase();"),
            ("/shout.js", "module.exports = () => 'wrong';"),
        ]));
        let result = project
            .offline()
            .execute_source("console.log(require('shout')('hey'))")
            .await;
        assert!(result.success);
        assert_eq!(project.console.output(Stream::Log), vec!["HEY"]);
    }

    #[tokio::test]
    async fn build_script_writes_output() {
        let project = Project::new(MemoryFs::with_files([(
            "/build.js",
            "const fs = require('fs');\nconst path = require('path');\n\
             const out = path.join('/dist', 'bundle.txt');\n\
             await fs.mkdir('/dist', { recursive: true });\n\
             await fs.writeFile(out, ['a', 'b'].join('\\n'));\n\
             return (await fs.readdir('/dist')).join(',');",
        )]));
        let result = project.offline().execute_file("/build.js").await;

        assert_eq!(result.output.as_deref(), Some("bundle.txt"));
        assert_eq!(project.fs.file_paths(), vec!["/build.js", "/dist/bundle.txt"]);
        assert_eq!(
            project.sink.events(),
            vec![
                ChangeEvent::folder("/dist").from_runtime(),
                ChangeEvent::file("/dist/bundle.txt", "a\nb").from_runtime(),
            ]
        );
    }

    #[tokio::test]
    async fn errors_inside_required_modules_name_the_file() {
        let project = Project::new(MemoryFs::with_files([(
            "/lib/broken.js",
            "throw new Error('boom');",
        )]));
        let result = project
            .offline()
            .execute_source("require('./lib/broken')")
            .await;
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("/lib/broken.js"), "{error}");
        assert!(error.contains("boom"), "{error}");
    }

    #[tokio::test]
    async fn runs_against_a_directory_on_disk() {
        let dir = assert_fs::TempDir::new().unwrap();
        std::fs::write(dir.path().join("hello.js"), "module.exports = 'hello from disk';").unwrap();
        let console = CapturedConsole::new();
        let runtime = NodeRuntime::new(
            Arc::new(LocalFs::new(dir.path().to_path_buf())),
            Arc::new(RecordingSink::new()),
            Arc::new(console.clone()),
            RuntimeSettings {
                cdn_fallback: false,
                ..RuntimeSettings::default()
            },
        )
        .unwrap();

        let result = runtime
            .execute_source("const fs = require('fs'); await fs.writeFile('/out.txt', require('./hello'))")
            .await;
        assert!(result.success, "{result:?}");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "hello from disk"
        );
    }
}

mod cdn {
    use super::*;

    #[tokio::test]
    async fn missing_packages_come_from_the_cdn_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tiny"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("module.exports = { add: (a, b) => a + b };"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let project = Project::new(MemoryFs::new());
        let runtime = project.runtime(cdn_settings(&server));
        let result = runtime
            .execute_source("const { add } = require('tiny'); console.log(add(2, 3))")
            .await;

        assert!(result.success, "{result:?}");
        assert_eq!(project.console.output(Stream::Log), vec!["5"]);
        assert_eq!(project.fs.file_paths(), vec!["/node_modules/tiny/index.js"]);
        assert_eq!(
            project.sink.events(),
            vec![ChangeEvent::file(
                "/node_modules/tiny/index.js",
                "module.exports = { add: (a, b) => a + b };"
            )
            .from_runtime()]
        );

        // A fresh runtime finds the persisted copy.
        let again = project.runtime(cdn_settings(&server));
        let result = again
            .execute_source("console.log(require('tiny').add(1, 1))")
            .await;
        assert!(result.success);
        assert_eq!(project.console.output(Stream::Log), vec!["5", "2"]);
    }

    #[tokio::test]
    async fn esm_packages_are_transformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esm-pkg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("export const label = 'esm';\nexport default function hi() { return 'hi'; }"),
            )
            .mount(&server)
            .await;

        let project = Project::new(MemoryFs::new());
        let result = project
            .runtime(cdn_settings(&server))
            .execute_source("import hi, { label } from 'esm-pkg'; console.log(hi(), label)")
            .await;
        assert!(result.success, "{result:?}");
        assert_eq!(project.console.output(Stream::Log), vec!["hi esm"]);
    }

    #[tokio::test]
    async fn unavailable_packages_are_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let project = Project::new(MemoryFs::new());
        let result = project
            .runtime(cdn_settings(&server))
            .execute_source("require('left-pad')")
            .await;
        assert_eq!(
            result.error.as_deref(),
            Some("Error: Cannot find module 'left-pad'")
        );
        assert!(project.fs.file_paths().is_empty());
    }

    #[tokio::test]
    async fn disabled_fallback_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("module.exports = 1"))
            .expect(0)
            .mount(&server)
            .await;

        let project = Project::new(MemoryFs::new());
        let result = project
            .runtime(RuntimeSettings {
                cdn_fallback: false,
                ..cdn_settings(&server)
            })
            .execute_source("require('anything')")
            .await;
        assert!(!result.success);
    }
}
