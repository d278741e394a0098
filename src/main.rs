use wgpu_irradiance::ReplayOptions;

fn parse_options() -> ReplayOptions {
    let mut options = ReplayOptions::default();
    let mut args = std::env::args().skip(1);

    if let Some(frames) = args.next().and_then(|arg| arg.parse().ok()) {
        options.frames = frames;
    }
    if let Some(speed) = args.next().and_then(|arg| arg.parse().ok()) {
        options.speed = speed;
    }
    options
}

fn main() {
    if let Err(err) = wgpu_irradiance::run(parse_options()) {
        eprintln!("Replay error: {err}");
        std::process::exit(1);
    }
}
