fn main() {
    match handle_cli_flags() {
        Some(Ok(())) => return,
        Some(Err(err)) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
        None => {}
    }

    if let Err(err) = lurk::run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> Option<anyhow::Result<()>> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("lurk {}", lurk::VERSION);
                return Some(Ok(()));
            }
            "--help" | "-h" => {
                println!(
                    "lurk: browse Reddit feeds, galleries and videos from the terminal.\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n  --login              Sign in with Reddit in the browser and store the token\n  --logout             Forget the stored token\n  --client-id ID [SECRET]  Save the Reddit app credentials to the config file"
                );
                return Some(Ok(()));
            }
            "--login" => return Some(lurk::app::login()),
            "--logout" => return Some(lurk::app::logout()),
            "--client-id" => {
                let Some(client_id) = args.next() else {
                    return Some(Err(anyhow::anyhow!("--client-id needs a value")));
                };
                let secret = args.next().unwrap_or_default();
                return Some(lurk::app::set_client_id(&client_id, &secret));
            }
            _ => {}
        }
    }
    None
}
