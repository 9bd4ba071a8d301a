use issuesync::{cli, telemetry};

fn main() {
    let cli = cli::parse_from(std::env::args_os());
    telemetry::init(cli.quiet, cli.verbose);

    match cli::run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!(
                transience = ?e.transience(),
                effect = e.effect().as_str(),
                "error: {e}"
            );
            std::process::exit(1);
        }
    }
}
