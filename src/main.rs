use log::{debug, info};
use pokebot::config::Config;
use pokebot::disassembler::Disassembler;
use pokebot::game::{GameData, MemoryGameData};
use pokebot::interpreter::Interpreter;
use pokebot::memory::MemoryImage;
use pokebot::vm::Context;
use std::env;
use std::fs::File;
use std::io::prelude::*;

fn usage(program: &str) {
    println!("pokebot - script disassembler and explorer for GBA Pokémon ROMs");
    println!();
    println!("Usage: {} <rom.gba> <address> [--explore] [--config file.toml]", program);
    println!("Examples:");
    println!("  {} firered.gba 0x081A8CED", program);
    println!("  {} firered.gba 0x081A8CED --explore", program);
}

fn parse_address(text: &str) -> Result<u32, String> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|_| format!("Invalid address: {}", text))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        usage(&args[0]);
        return Ok(());
    }

    let rom_path = &args[1];
    let address = parse_address(&args[2])?;
    let mut explore = false;
    let mut config = Config::default();

    let mut rest = args[3..].iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--explore" => explore = true,
            "--config" => {
                let path = rest.next().ok_or("--config needs a file")?;
                config = Config::load(path)?;
                info!("Configuration loaded from {}", path);
            }
            other => {
                eprintln!("Error: unknown option '{}'", other);
                usage(&args[0]);
                std::process::exit(1);
            }
        }
    }

    debug!("Loading ROM: {}", rom_path);
    let mut file = match File::open(rom_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error: Cannot open ROM '{}': {}", rom_path, e);
            std::process::exit(1);
        }
    };
    let mut rom = Vec::new();
    file.read_to_end(&mut rom)?;
    info!("ROM size: {:#x} bytes", rom.len());

    let memory = MemoryImage::new().with_region(MemoryImage::ROM, rom);
    let game = MemoryGameData::new(&memory, config.layout.clone());

    let listing = Disassembler::new(&memory)
        .with_move_names(game.move_names())
        .print(address);
    print!("{}", listing);

    if explore {
        let interp = Interpreter::new(&memory, &game, config.explore.clone());
        let closed = interp.explore(Context::blank(address))?;
        println!();
        println!("{} outcomes", closed.len());
        for (i, ctx) in closed.iter().enumerate() {
            let inputs: Vec<String> = ctx.inputs.iter().map(|a| a.to_string()).collect();
            let outputs: Vec<String> = ctx.outputs.iter().map(|a| a.to_string()).collect();
            println!(
                "#{:<3} {:?} choices {:?}\n     reads  [{}]\n     writes [{}]",
                i,
                ctx.exit.unwrap_or(pokebot::vm::ExitReason::End),
                ctx.choices,
                inputs.join(", "),
                outputs.join(", ")
            );
        }
    }

    Ok(())
}
