use docopt::Docopt;

use wmlkit::run::{self, Args, USAGE};

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    run::args(&args);
}
