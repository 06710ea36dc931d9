use std::env;
use std::process;

use log::info;
use m3u8get_core::M3u8Downloader;

struct Options {
    input: String,
    output: String,
    master: bool,
    name: Option<String>,
    bandwidth: Option<String>,
    resolution: Option<String>,
    merge: bool,
    skip_space_check: bool,
    threads: Option<usize>,
    debug: bool,
    debug_path: Option<String>,
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            print_usage();
            return;
        }
        Err(message) => {
            eprintln!("error: {message}");
            print_usage();
            process::exit(2);
        }
    };

    let mut downloader = match M3u8Downloader::new(&options.input, &options.output) {
        Ok(downloader) => downloader,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(1);
        }
    };

    if let Some(threads) = options.threads {
        if let Err(err) = downloader.set_max_threads(threads) {
            eprintln!("error: {err}");
            process::exit(1);
        }
    }
    downloader.set_skip_space_check(options.skip_space_check);
    if let Some(path) = &options.debug_path {
        if let Err(err) = downloader.set_debug_path(path.clone()) {
            eprintln!("error: {err}");
            process::exit(1);
        }
    }
    downloader.set_debug(options.debug);

    info!("downloading {} -> {}", options.input, options.output);
    let result = if options.master {
        downloader.download_master_playlist(
            options.name.as_deref(),
            options.bandwidth.as_deref(),
            options.resolution.as_deref(),
            options.merge,
        )
    } else {
        downloader.download_playlist(options.merge)
    };

    match result {
        Ok(()) => println!("download complete: {}", downloader.output()),
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(1);
        }
    }
}

fn parse_args(args: &[String]) -> Result<Option<Options>, String> {
    let mut positional = Vec::new();
    let mut options = Options {
        input: String::new(),
        output: String::new(),
        master: false,
        name: None,
        bandwidth: None,
        resolution: None,
        merge: true,
        skip_space_check: false,
        threads: None,
        debug: false,
        debug_path: None,
    };

    let mut index = 0;
    while index < args.len() {
        let arg = &args[index];
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "--master" => options.master = true,
            "--no-merge" => options.merge = false,
            "--skip-space-check" => options.skip_space_check = true,
            "--name" => {
                options.name = Some(take_value(args, &mut index, "--name")?);
                options.master = true;
            }
            "--bandwidth" => {
                options.bandwidth = Some(take_value(args, &mut index, "--bandwidth")?);
                options.master = true;
            }
            "--resolution" => {
                options.resolution = Some(take_value(args, &mut index, "--resolution")?);
                options.master = true;
            }
            "--threads" => {
                let value = take_value(args, &mut index, "--threads")?;
                let threads = value
                    .parse::<usize>()
                    .map_err(|_| format!("--threads expects a number, got \"{value}\""))?;
                options.threads = Some(threads);
            }
            "--debug" => {
                options.debug = true;
                if let Some(next) = args.get(index + 1) {
                    if !next.starts_with('-') {
                        options.debug_path = Some(next.clone());
                        index += 1;
                    }
                }
            }
            other if other.starts_with('-') => {
                return Err(format!("unknown option \"{other}\""));
            }
            _ => positional.push(arg.clone()),
        }
        index += 1;
    }

    match positional.as_slice() {
        [] => Ok(None),
        [input, output] => {
            options.input = input.clone();
            options.output = output.clone();
            Ok(Some(options))
        }
        _ => Err("expected exactly two positional arguments: <input> <output>".to_string()),
    }
}

fn take_value(args: &[String], index: &mut usize, flag: &str) -> Result<String, String> {
    *index += 1;
    args.get(*index)
        .cloned()
        .ok_or_else(|| format!("{flag} expects a value"))
}

fn print_usage() {
    eprintln!(
        "Usage: m3u8get <input> <output> [options]\n\
Download an HLS playlist into a single .ts file (or numbered segments).\n\
Options:\n\
  --master              Input is a master playlist\n\
  --name <NAME>         Variant name to select (implies --master)\n\
  --bandwidth <BW>      Variant bandwidth to select (implies --master)\n\
  --resolution <WxH>    Variant resolution to select (implies --master)\n\
  --no-merge            Keep per-segment files instead of concatenating\n\
  --skip-space-check    Skip the free-space preflight\n\
  --threads <N>         Max parallel segment downloads (default 10)\n\
  --debug [PATH]        Append diagnostic records to PATH (default debug.log)\n\
  -h, --help            Show this help"
    );
}
