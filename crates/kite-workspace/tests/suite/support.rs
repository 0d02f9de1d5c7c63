use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use kite_workspace::{DocumentUri, KiteConfig, ProgressEvent, ProgressReceiver, Workspace};
use lsp_types::{
    DidOpenTextDocumentParams, TextDocumentIdentifier, TextDocumentItem,
    TextDocumentPositionParams,
};

pub const MAIN_KT: &str = "package app

import lib.Greeter

fun main() {
    val greeter = Greeter()
    helper()
}
";

pub const UTIL_KT: &str = "package app

fun helper(): Int = 42

class Box {
    fun open() {}
}
";

/// Tempdir with its canonical path, so roots compare equal to paths derived from URIs.
pub fn canonical_tempdir() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().canonicalize().unwrap();
    (dir, path)
}

pub fn write(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

pub fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let file = fs::File::create(path).unwrap();
    let mut jar = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, bytes) in entries {
        jar.start_file(*name, options).unwrap();
        jar.write_all(bytes).unwrap();
    }
    jar.finish().unwrap();
}

/// A root named `app` with two sources and `libs/greet.jar` providing `lib.Greeter`.
pub fn sample_project(base: &Path) -> PathBuf {
    let root = base.join("app");
    write(&root.join("src/app/Main.kt"), MAIN_KT);
    write(&root.join("src/app/Util.kt"), UTIL_KT);
    write_jar(
        &root.join("libs/greet.jar"),
        &[("lib/Greeter.class", b"\xca\xfe\xba\xbe Greeter bytes")],
    );
    root
}

pub fn workspace() -> Workspace {
    Workspace::new(KiteConfig::default()).unwrap()
}

pub fn doc(path: &Path) -> DocumentUri {
    DocumentUri::File(path.to_path_buf())
}

pub fn lsp_uri(path: &Path) -> lsp_types::Uri {
    doc(path).to_string().parse().unwrap()
}

pub fn open_params(path: &Path, text: &str) -> DidOpenTextDocumentParams {
    DidOpenTextDocumentParams {
        text_document: TextDocumentItem {
            uri: lsp_uri(path),
            language_id: "kotlin".to_string(),
            version: 1,
            text: text.to_string(),
        },
    }
}

pub fn position(path: &Path, line: u32, character: u32) -> TextDocumentPositionParams {
    TextDocumentPositionParams {
        text_document: TextDocumentIdentifier { uri: lsp_uri(path) },
        position: lsp_types::Position::new(line, character),
    }
}

/// Every progress event published so far.
pub fn drain(rx: &mut ProgressReceiver) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// `(message, percentage)` of every `Report` event.
pub fn reports(events: &[ProgressEvent]) -> Vec<(String, Option<u32>)> {
    events
        .iter()
        .filter_map(|event| match event {
            ProgressEvent::Report {
                message: Some(message),
                percentage,
                ..
            } => Some((message.clone(), *percentage)),
            _ => None,
        })
        .collect()
}
