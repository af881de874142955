//! glTF extension tool
//!
//! Inspects the extension blocks of a glTF/GLB document, or runs a full
//! import/export round trip through the extension pipeline with passthrough
//! handlers for every extension found.
//!
//! Run with: cargo run --bin gltf-ext -- inspect scene.gltf
//!       or: cargo run --bin gltf-ext -- roundtrip in.glb out.gltf --config pipeline.toml

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use void_gltf::{ContainerKind, Document};
use void_gltf_ext::names;
use void_gltf_ext::prelude::*;
use void_gltf_ext::{DocumentExporter, PassthroughHandler, PipelineConfig};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Longest block preview printed by `inspect`
const PREVIEW_LEN: usize = 72;

const USAGE: &str = "\
Usage:
  gltf-ext inspect <file>
  gltf-ext roundtrip <in> <out> [--config <toml>]";

#[derive(Debug)]
enum Command {
    Inspect {
        path: PathBuf,
    },
    Roundtrip {
        input: PathBuf,
        output: PathBuf,
        config: Option<PathBuf>,
    },
}

impl Command {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let command = args.next().ok_or("missing command")?;
        match command.as_str() {
            "inspect" => {
                let path = args.next().ok_or("inspect: missing <file>")?;
                if let Some(extra) = args.next() {
                    return Err(format!("inspect: unexpected argument '{}'", extra));
                }
                Ok(Self::Inspect { path: path.into() })
            }
            "roundtrip" => {
                let mut positional = Vec::new();
                let mut config = None;
                while let Some(arg) = args.next() {
                    match arg.as_str() {
                        "--config" => {
                            let path = args.next().ok_or("--config: missing <toml>")?;
                            config = Some(PathBuf::from(path));
                        }
                        _ if arg.starts_with("--") => {
                            return Err(format!("roundtrip: unknown option '{}'", arg));
                        }
                        _ => positional.push(PathBuf::from(arg)),
                    }
                }
                let [input, output]: [PathBuf; 2] = positional
                    .try_into()
                    .map_err(|_| "roundtrip: expected <in> <out>".to_string())?;
                Ok(Self::Roundtrip {
                    input,
                    output,
                    config,
                })
            }
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let command = match Command::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };

    let result = match command {
        Command::Inspect { path } => inspect(&path),
        Command::Roundtrip {
            input,
            output,
            config,
        } => match load_config(config.as_deref()) {
            Ok(config) => roundtrip(&input, &output, config).await,
            Err(e) => Err(e),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn inspect(path: &Path) -> CliResult<()> {
    let bytes = std::fs::read(path)?;
    let document = Document::parse(&bytes)?;

    println!("{}", path.display());
    println!(
        "  container: {}",
        match document.container() {
            ContainerKind::Json => "json",
            ContainerKind::Binary => "glb",
        }
    );
    if let Some(binary) = document.binary() {
        println!("  binary chunk: {} bytes", binary.len());
    }
    println!("  nodes: {}", document.node_count());
    println!("  extensionsUsed: {:?}", document.extensions_used()?);
    println!("  extensionsRequired: {:?}", document.extensions_required()?);

    if let Some(blocks) = document.document_extensions()? {
        println!("  document extensions:");
        for (name, block) in blocks {
            println!("    {}{} {}", name, known_marker(name), preview(block)?);
        }
    }

    for node in 0..document.node_count() {
        let Some(blocks) = document.node_extensions(node)? else {
            continue;
        };
        let label = document.node_name(node)?.unwrap_or("<unnamed>");
        println!("  node {} ({}):", node, label);
        for (name, block) in blocks {
            println!("    {}{} {}", name, known_marker(name), preview(block)?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> CliResult<PipelineConfig> {
    Ok(match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    })
}

/// Import `input`, export it again over the parsed document and write `output`
///
/// Meshes, materials, buffers, node transforms and the binary chunk come from
/// the input; extension blocks come from the passthrough handlers.
async fn roundtrip(input: &Path, output: &Path, config: PipelineConfig) -> CliResult<()> {
    let bytes = std::fs::read(input)?;
    let document = Document::parse(&bytes)?;

    let registry = SharedExtensionRegistry::new();
    let mut extension_names = document.extension_names()?;
    extension_names.extend(names::KNOWN.iter().map(|name| name.to_string()));
    for name in extension_names {
        if !registry.read().contains(&name) {
            registry.register(Registration::node_and_document(PassthroughHandler::new(name)))?;
        }
    }
    log::info!("Registered {} passthrough handlers", registry.read().len());

    let pipeline = ExtensionPipeline::with_config(registry, config);
    let cancel = CancellationToken::new();
    let mut scene = MemoryScene::new();

    let imported = pipeline
        .import_document(document, &mut scene, &HierarchyInstantiator, &cancel)
        .await?;
    for diagnostic in &imported.report.diagnostics {
        println!("import: {}", diagnostic);
    }

    let exporter = DocumentExporter::new(imported.document);
    let exported = pipeline.export(&scene, &exporter, &cancel).await?;
    for diagnostic in &exported.report.diagnostics {
        println!("export: {}", diagnostic);
    }

    let mut document = exported.document;
    let wants_binary = output
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("glb"));
    if wants_binary {
        document.set_container(ContainerKind::Binary);
    } else {
        if let Some(binary) = document.binary() {
            log::warn!(
                "Dropping {} byte binary chunk; {} is written as plain JSON",
                binary.len(),
                output.display()
            );
        }
        document.set_binary(None);
        document.set_container(ContainerKind::Json);
    }
    std::fs::write(output, document.to_bytes()?)?;

    println!(
        "{} -> {}: {} nodes, {} extensions, {} diagnostics",
        input.display(),
        output.display(),
        document.node_count(),
        exported.report.emitted.len(),
        imported.report.diagnostics.len() + exported.report.diagnostics.len()
    );
    Ok(())
}

fn known_marker(name: &str) -> &'static str {
    if names::is_known(name) {
        ""
    } else {
        " (unrecognized)"
    }
}

fn preview(block: &serde_json::Value) -> CliResult<String> {
    let mut text = serde_json::to_string(block)?;
    if text.len() > PREVIEW_LEN {
        let mut end = PREVIEW_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        text.push_str("...");
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, String> {
        Command::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_inspect() {
        let command = parse(&["inspect", "scene.gltf"]).unwrap();
        assert!(matches!(command, Command::Inspect { path } if path == PathBuf::from("scene.gltf")));
        assert!(parse(&["inspect"]).is_err());
        assert!(parse(&["inspect", "a", "b"]).is_err());
    }

    #[test]
    fn test_parse_roundtrip() {
        let command = parse(&["roundtrip", "--config", "p.toml", "in.glb", "out.gltf"]).unwrap();
        match command {
            Command::Roundtrip {
                input,
                output,
                config,
            } => {
                assert_eq!(input, PathBuf::from("in.glb"));
                assert_eq!(output, PathBuf::from("out.gltf"));
                assert_eq!(config, Some(PathBuf::from("p.toml")));
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(parse(&["roundtrip", "in.glb"]).is_err());
        assert!(parse(&["roundtrip", "a", "b", "--verbose"]).is_err());
        assert!(parse(&["convert"]).is_err());
        assert!(parse(&[]).is_err());
    }

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("gltf-ext-{}-{}", std::process::id(), name))
    }

    fn seated_glb() -> Vec<u8> {
        let json = serde_json::json!({
            "asset": {"version": "2.0"},
            "extensionsUsed": ["OMI_seat"],
            "buffers": [{"byteLength": 8}],
            "bufferViews": [{"buffer": 0, "byteLength": 8}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
            "materials": [{"name": "wood"}],
            "nodes": [
                {"name": "room", "children": [1]},
                {
                    "name": "chair",
                    "mesh": 0,
                    "translation": [0.0, 0.5, 2.0],
                    "extensions": {"OMI_seat": {"back": [0.0, 0.0, -1.0], "angle": 1.5}}
                }
            ],
            "scenes": [{"nodes": [0]}],
            "scene": 0
        });
        let json = serde_json::to_vec(&json).unwrap();
        void_gltf::glb::write(&json, Some(&[7u8; 8])).unwrap()
    }

    #[tokio::test]
    async fn test_roundtrip_keeps_base_content() {
        let input = scratch_path("in.glb");
        let output = scratch_path("out.glb");
        std::fs::write(&input, seated_glb()).unwrap();

        roundtrip(&input, &output, PipelineConfig::default()).await.unwrap();
        let document = Document::parse(&std::fs::read(&output).unwrap()).unwrap();
        std::fs::remove_file(&input).ok();
        std::fs::remove_file(&output).ok();

        assert_eq!(document.container(), ContainerKind::Binary);
        assert_eq!(document.binary(), Some(&[7u8; 8][..]));
        assert_eq!(document.resource_len("meshes"), Some(1));
        assert_eq!(document.resource_len("materials"), Some(1));
        assert_eq!(document.resource_len("buffers"), Some(1));
        assert_eq!(document.resource_len("bufferViews"), Some(1));

        let chair = document.node(1).unwrap();
        assert_eq!(chair["name"], serde_json::json!("chair"));
        assert_eq!(chair["mesh"], serde_json::json!(0));
        assert_eq!(chair["translation"], serde_json::json!([0.0, 0.5, 2.0]));
        assert_eq!(
            document.node_extension(1, names::OMI_SEAT).unwrap(),
            Some(&serde_json::json!({"back": [0.0, 0.0, -1.0], "angle": 1.5}))
        );
        assert_eq!(document.node_children(0).unwrap(), Some(vec![1]));
        assert!(document.extensions_used().unwrap().contains(&names::OMI_SEAT));
    }

    #[tokio::test]
    async fn test_roundtrip_to_json_drops_binary_chunk() {
        let input = scratch_path("json-in.glb");
        let output = scratch_path("json-out.gltf");
        std::fs::write(&input, seated_glb()).unwrap();

        roundtrip(&input, &output, PipelineConfig::default()).await.unwrap();
        let bytes = std::fs::read(&output).unwrap();
        std::fs::remove_file(&input).ok();
        std::fs::remove_file(&output).ok();

        assert_eq!(bytes.first(), Some(&b'{'));
        let document = Document::parse(&bytes).unwrap();
        assert_eq!(document.container(), ContainerKind::Json);
        assert!(document.binary().is_none());
        assert_eq!(document.node(1).unwrap()["mesh"], serde_json::json!(0));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let block = serde_json::json!({"label": "é".repeat(60)});
        let text = preview(&block).unwrap();
        assert!(text.ends_with("..."));
        assert!(text.len() <= PREVIEW_LEN + 3);
    }
}
