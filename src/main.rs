use classpatch::instrument::{self, Settings};
use classpatch::jvm::class_file::ClassFile;

use clap::{crate_version, Arg, ArgAction, Command};
use std::error::Error;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let matches = Command::new("classpatch")
        .version(crate_version!())
        .about("Patches the bytecode of JVM class files")
        .arg(
            Arg::new("INPUT")
                .help("Class file to patch")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .index(1),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Where to write the patched class (defaults to overwriting INPUT)"),
        )
        .arg(
            Arg::new("trace entries")
                .long("trace-entries")
                .action(ArgAction::SetTrue)
                .help("Print `Class.method(descriptor)` on entry to every method"),
        )
        .arg(
            Arg::new("method")
                .long("method")
                .value_name("NAME")
                .action(ArgAction::Append)
                .help("Only trace methods with this name (can be repeated)"),
        )
        .arg(
            Arg::new("trace class")
                .long("trace-class")
                .value_name("CLASS")
                .default_value("java/lang/System")
                .help("Class declaring the static `PrintStream` field traces go to"),
        )
        .arg(
            Arg::new("trace field")
                .long("trace-field")
                .value_name("NAME")
                .default_value("out")
                .help("Static `PrintStream` field traces go to"),
        )
        .arg(
            Arg::new("create dirs")
                .long("create-dirs")
                .action(ArgAction::SetTrue)
                .help("Create missing parent directories of the output"),
        )
        .get_matches();

    let input = matches
        .get_one::<PathBuf>("INPUT")
        .ok_or("missing input class file")?;
    let output = matches.get_one::<PathBuf>("output").unwrap_or(input);

    log::info!("Reading '{}'", input.display());
    let mut class = ClassFile::read_from_path(input)?;

    if matches.get_flag("trace entries") {
        let settings = Settings::new(
            matches
                .get_many::<String>("method")
                .map(|names| names.cloned().collect())
                .unwrap_or_default(),
            matches
                .get_one::<String>("trace class")
                .cloned()
                .unwrap_or_default(),
            matches
                .get_one::<String>("trace field")
                .cloned()
                .unwrap_or_default(),
        );
        let traced = instrument::trace_method_entries(&mut class, &settings)?;
        log::info!("Traced entries to {} method(s)", traced);
    } else {
        instrument::relax_all(&mut class)?;
    }

    log::info!("Writing '{}'", output.display());
    class.save_to_path(output, matches.get_flag("create dirs"))?;
    Ok(())
}
