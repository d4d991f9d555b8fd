use discourse_graph::format::{extract_content_from_title, validate_node_format};
use discourse_graph::measure::{FixedImageLoader, FontFamily, SizeStyle, TextMetrics};
use discourse_graph::migrate::discourse_node_migrations;
use discourse_graph::settings::Settings;
use discourse_graph::size::{NodeSizeCalculator, SizeRequest};
use discourse_graph::sync::RelationSynchronizer;
use discourse_graph::vault::FsVault;
use std::env;
use std::fs;
use std::process;
use tracing_subscriber::EnvFilter;

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <command> [args] [options]", program);
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  validate-format <format>                      Check a node title format");
    eprintln!("  extract <format> <title>                      Print the content part of a title");
    eprintln!("  size <title> [options]                        Print the shape size as JSON");
    eprintln!("  migrate <canvas.json>                         Upgrade discourse node shapes");
    eprintln!("  link <vault> <source> <target> <relation>     Link two documents");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --settings <file>  Settings JSON (default: built-in node and relation types)");
    eprintln!("  -t, --type <id>        Node type id (size)");
    eprintln!("  -s, --size <style>     Size style: s, m, l, xl (default: s)");
    eprintln!("  -f, --font <family>    Font family: draw, sans, serif, mono (default: draw)");
    eprintln!("  -i, --image <WxH>      Key image dimensions (size)");
    eprintln!("  -o, --output <file>    Output file (migrate, default: stdout)");
    process::exit(1);
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("{}", msg);
    process::exit(1);
}

#[derive(Default)]
struct Options {
    positional: Vec<String>,
    settings: Option<String>,
    node_type: Option<String>,
    size: SizeStyle,
    font: FontFamily,
    image: Option<(f64, f64)>,
    output: Option<String>,
}

fn parse_image(s: &str) -> Option<(f64, f64)> {
    let (w, h) = s.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

fn value(args: &[String], i: usize) -> &String {
    args.get(i + 1)
        .unwrap_or_else(|| fail(format!("Missing value for {}", args[i])))
}

fn parse_options(args: &[String]) -> Options {
    let mut opts = Options::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--settings" => {
                opts.settings = Some(value(args, i).clone());
                i += 1;
            }
            "-t" | "--type" => {
                opts.node_type = Some(value(args, i).clone());
                i += 1;
            }
            "-s" | "--size" => {
                let v = value(args, i);
                opts.size = SizeStyle::from_str(v)
                    .unwrap_or_else(|| fail(format!("Invalid size style: {}", v)));
                i += 1;
            }
            "-f" | "--font" => {
                let v = value(args, i);
                opts.font = FontFamily::from_str(v)
                    .unwrap_or_else(|| fail(format!("Invalid font family: {}", v)));
                i += 1;
            }
            "-i" | "--image" => {
                let v = value(args, i);
                opts.image =
                    Some(parse_image(v).unwrap_or_else(|| fail(format!("Invalid image size: {}", v))));
                i += 1;
            }
            "-o" | "--output" => {
                opts.output = Some(value(args, i).clone());
                i += 1;
            }
            s if s.starts_with('-') && s.len() > 1 => fail(format!("Unknown option: {}", s)),
            _ => opts.positional.push(args[i].clone()),
        }
        i += 1;
    }
    opts
}

fn load_settings(opts: &Options) -> Settings {
    match &opts.settings {
        Some(path) => Settings::load(path).unwrap_or_else(|e| fail(e)),
        None => Settings::default(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
    }
    let command = args[1].as_str();
    let opts = parse_options(&args[2..]);
    let pos = &opts.positional;

    match (command, pos.len()) {
        ("validate-format", 1) => match validate_node_format(&pos[0]) {
            Ok(()) => println!("ok"),
            Err(e) => fail(e),
        },
        ("extract", 2) => println!("{}", extract_content_from_title(&pos[0], &pos[1])),
        ("size", 1) => {
            let settings = load_settings(&opts);
            let measurer = TextMetrics::default();
            let loader = match opts.image {
                Some((w, h)) => FixedImageLoader::new(w, h),
                None => FixedImageLoader::default(),
            };
            let calc = NodeSizeCalculator::new(&settings, &measurer, &loader);
            let size = calc
                .compute_size(SizeRequest {
                    title: &pos[0],
                    node_type_id: opts.node_type.as_deref().unwrap_or_default(),
                    image_src: opts.image.map(|_| "key-image"),
                    size: opts.size,
                    font_family: opts.font,
                })
                .await;
            match serde_json::to_string(&size) {
                Ok(json) => println!("{}", json),
                Err(e) => fail(e),
            }
        }
        ("migrate", 1) => {
            let input = fs::read_to_string(&pos[0])
                .unwrap_or_else(|e| fail(format!("Failed to read {}: {}", pos[0], e)));
            let (json, report) = discourse_node_migrations()
                .migrate_snapshot_json(&input)
                .unwrap_or_else(|e| fail(format!("Migration error: {}", e)));
            eprintln!(
                "Migrated {} shapes (version {} -> {})",
                report.migrated, report.from_version, report.to_version
            );
            match &opts.output {
                Some(path) => {
                    if let Err(e) = fs::write(path, &json) {
                        fail(format!("Failed to write {}: {}", path, e));
                    }
                }
                None => println!("{}", json),
            }
        }
        ("link", 4) => {
            let settings = load_settings(&opts);
            let vault = FsVault::open(&pos[0]).unwrap_or_else(|e| fail(e));
            let sync = RelationSynchronizer::new(&settings, &vault, &vault);
            match sync.link_relation(&pos[1], &pos[2], &pos[3]).await {
                Ok(outcome) => println!(
                    "forward: {}, reverse: {}",
                    if outcome.forward_added { "added" } else { "present" },
                    if outcome.reverse_added { "added" } else { "present" },
                ),
                Err(e) => fail(e),
            }
        }
        _ => usage(&args[0]),
    }
}
