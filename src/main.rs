use std::io::Write;
use std::process;

use env_logger::{Builder, Env};
use jobherd::{cli, run};

fn init_logger() {
    let env = Env::new().filter_or("JOBHERD_LOG", "warn");
    let res = Builder::from_env(env)
        .format(|buf, r| writeln!(buf, "*** {}", r.args()))
        .try_init();
    if let Err(err) = res {
        eprintln!("unable to initialize logger: {}", err);
    }
}

fn main() {
    init_logger();

    let status = match cli::parse(std::env::args_os()).and_then(|config| run(&config)) {
        Ok(outcome) => {
            log::info!("supervision over: {:?}", outcome);
            0
        }
        Err(err) => {
            eprintln!("{}", err);
            log::debug!("{:?}", err);
            err.exit_code()
        }
    };

    process::exit(status);
}
