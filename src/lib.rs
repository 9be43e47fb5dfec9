#![allow(dead_code)]

#[macro_use]
extern crate lazy_static;

pub mod actors;
pub mod config;
pub mod disassembler;
pub mod error;
pub mod game;
pub mod instruction;
pub mod interpreter;
pub mod memory;
pub mod metafinder;
pub mod opcode_tables;
pub mod pathfinder;
pub mod script;
pub mod text;
pub mod vm;
pub mod world;

#[cfg(test)]
mod interpreter_tests;
#[cfg(test)]
mod pathfinder_tests;

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::disassembler::Disassembler;
    use crate::memory::MemoryImage;
    use crate::opcode_tables;
    use log;

    use test_log::test;

    #[test]
    fn default_config_listing() {
        let config = Config::default();
        log::info!("{:#?}", config.layout);
        assert!(opcode_tables::registered_count() > 180);

        let rom = MemoryImage::new().with_region(MemoryImage::ROM, vec![0x02]);
        let listing = Disassembler::new(&rom).print(MemoryImage::ROM);
        assert_eq!(listing, "0x08000000: end\n");
    }
}

/*
Address space seen by the scripts
0x02000000  EWRAM   save blocks, bag, overworld objects
0x03000000  IWRAM   save block pointers
0x08000000  ROM     scripts, map banks, standard scripts,
                    multichoice lists, move names
*/
