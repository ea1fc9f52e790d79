use gtrun::{ExitStatus, gtrun_main};

fn main() -> ExitStatus {
    gtrun_main(|args| args)
}
