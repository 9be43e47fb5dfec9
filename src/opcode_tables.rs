//! The script command table: one descriptor per registered opcode byte.
//!
//! Opcodes with no descriptor are unregistered; decoding one is a fatal
//! error for the caller.

/// Operand formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arg {
    Byte,
    Word,
    Dword,
    Ptr,
    /// Variable id (0x4000.. or 0x8000..)
    Var,
    Flag,
    Bank,
    Buffer,
    Hidden,
    /// Pointer, or bank index when below 4
    PtrOrBank,
    /// Pointer, or bank 0 when zero
    PtrOrBank0,
    /// Flag id, or variable holding the flag id
    FlagOrVar,
    /// Literal word, or variable holding it
    WordOrVar,
    /// Literal byte stored as a word, or variable holding it
    ByteOrVar,
}

impl Arg {
    /// Encoded size in bytes
    pub fn size(&self) -> u32 {
        match self {
            Arg::Byte | Arg::Bank | Arg::Buffer | Arg::Hidden => 1,
            Arg::Word | Arg::Var | Arg::Flag | Arg::FlagOrVar | Arg::WordOrVar | Arg::ByteOrVar => 2,
            Arg::Dword | Arg::Ptr | Arg::PtrOrBank | Arg::PtrOrBank0 => 4,
        }
    }

    /// Whether the operand may name a variable to be dereferenced
    pub fn may_be_var(&self) -> bool {
        matches!(self, Arg::FlagOrVar | Arg::WordOrVar | Arg::ByteOrVar)
    }
}

/// Static metadata for one opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub opcode: u8,
    pub op: Op,
    /// Print template, `%#x`/`%d`/`0x%08x` placeholders
    pub format: &'static str,
    pub args: &'static [Arg],
}

impl Command {
    /// Mnemonic (first word of the print template)
    pub fn name(&self) -> &'static str {
        self.format.split(' ').next().unwrap_or("")
    }

    /// Encoded size of the fixed-format instruction, opcode included
    pub fn size(&self) -> u32 {
        1 + self.args.iter().map(Arg::size).sum::<u32>()
    }
}

macro_rules! commands {
    ($( $byte:literal => $variant:ident, $fmt:literal, [$($arg:ident),*]; )*) => {
        /// Every registered opcode
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Op {
            $($variant),*
        }

        lazy_static! {
            static ref TABLE: [Option<Command>; 256] = {
                let mut table: [Option<Command>; 256] = [None; 256];
                $(
                    table[$byte] = Some(Command {
                        opcode: $byte,
                        op: Op::$variant,
                        format: $fmt,
                        args: &[$(Arg::$arg),*],
                    });
                )*
                table
            };
        }
    };
}

commands! {
    0x00 => Nop, "nop", [];
    0x01 => Nop1, "nop1", [];
    0x02 => End, "end", [];
    0x03 => Return, "return", [];
    0x04 => Call, "call 0x%08x", [Ptr];
    0x05 => Goto, "goto 0x%08x", [Ptr];
    0x06 => If1, "if1 %#x 0x%08x", [Byte, Ptr];
    0x07 => If2, "if2 %#x 0x%08x", [Byte, Ptr];
    0x08 => GotoStd, "gotostd %#x", [Byte];
    0x09 => CallStd, "callstd %#x", [Byte];
    0x0A => GotoStdIf, "gotostdif %#x %#x", [Byte, Byte];
    0x0B => CallStdIf, "callstdif %#x %#x", [Byte, Byte];
    0x0C => JumpRam, "jumpram", [];
    0x0D => KillScript, "killscript", [];
    0x0E => SetByte, "setbyte %#x", [Byte];
    0x0F => LoadPointer, "loadpointer %d %#x", [Bank, Dword];
    0x10 => SetByte2, "setbyte2 %d %#x", [Bank, Byte];
    0x11 => WriteByteToOffset, "writebytetooffset %#x 0x%08x", [Byte, Ptr];
    0x12 => LoadByteFromPointer, "loadbytefrompointer %d 0x%08x", [Bank, Ptr];
    0x13 => SetFarByte, "setfarbyte %d 0x%08x", [Bank, Ptr];
    0x14 => CopyScriptBanks, "copyscriptbanks %d %d", [Bank, Bank];
    0x15 => CopyByte, "copybyte 0x%08x 0x%08x", [Ptr, Ptr];
    0x16 => SetVar, "setvar %#x %#x", [Var, Word];
    0x17 => AddVar, "addvar %#x %#x", [Var, Word];
    0x18 => SubVar, "subvar %#x %#x", [Var, WordOrVar];
    0x19 => CopyVar, "copyvar %#x %#x", [Var, Var];
    0x1A => CopyVarIfNotZero, "copyvarifnotzero %#x %#x", [Var, WordOrVar];
    0x1B => CompareBanks, "comparebanks %d %d", [Bank, Bank];
    0x1C => CompareBankToByte, "comparebanktobyte %d %#x", [Bank, Byte];
    0x1D => CompareBankToFarByte, "comparebanktofarbyte %d 0x%08x", [Bank, Ptr];
    0x1E => CompareFarByteToBank, "comparefarbytetobank 0x%08x %d", [Ptr, Bank];
    0x1F => CompareFarByteToByte, "comparefarbytetobyte 0x%08x %#x", [Ptr, Byte];
    0x20 => CompareFarBytes, "comparefarbytes 0x%08x 0x%08x", [Ptr, Ptr];
    0x21 => Compare, "compare %#x %#x", [Var, Word];
    0x22 => CompareVars, "comparevars %#x %#x", [Var, Var];
    0x23 => CallAsm, "callasm 0x%08x", [Ptr];
    0x24 => Cmd24, "cmd24 0x%08x", [Ptr];
    0x25 => Special, "special %#x", [Word];
    0x26 => Special2, "special2 %#x %#x", [Var, Word];
    0x27 => WaitState, "waitstate", [];
    0x28 => Pause, "pause %#x", [Word];
    0x29 => SetFlag, "setflag %#x", [FlagOrVar];
    0x2A => ClearFlag, "clearflag %#x", [FlagOrVar];
    0x2B => CheckFlag, "checkflag %#x", [FlagOrVar];
    0x2C => Cmd2C, "cmd2c", [];
    0x2D => CheckDailyFlags, "checkdailyflags", [];
    0x2E => ResetVars, "resetvars", [];
    0x2F => Sound, "sound %#x", [Word];
    0x30 => CheckSound, "checksound", [];
    0x31 => Fanfare, "fanfare %#x", [WordOrVar];
    0x32 => WaitFanfare, "waitfanfare", [];
    0x33 => PlaySong, "playsong %#x %#x", [Word, Byte];
    0x34 => PlaySong2, "playsong2 %#x", [Word];
    0x35 => FadeDefault, "fadedefault", [];
    0x36 => FadeSong, "fadesong %#x", [Word];
    0x37 => FadeOut, "fadeout %#x", [Byte];
    0x38 => FadeIn, "fadein %#x", [Byte];
    0x39 => Warp, "warp (bank=%d,map=%d) warp#%d (x=%d,y=%d)", [Byte, Byte, Byte, ByteOrVar, ByteOrVar];
    0x3A => WarpMuted, "warpmuted (bank=%d,map=%d) warp#%d (x=%d,y=%d)", [Byte, Byte, Byte, ByteOrVar, ByteOrVar];
    0x3B => WarpWalk, "warpwalk (bank=%d,map=%d) warp#%d (x=%d,y=%d)", [Byte, Byte, Byte, ByteOrVar, ByteOrVar];
    0x3C => WarpHole, "warphole %#x %#x", [Byte, Byte];
    0x3D => WarpTeleport, "warpteleport (bank=%d,map=%d) warp#%d (x=%d,y=%d)", [Byte, Byte, Byte, ByteOrVar, ByteOrVar];
    0x3E => Warp3, "warp3 (bank=%d,map=%d) warp#%d (x=%d,y=%d)", [Byte, Byte, Byte, ByteOrVar, ByteOrVar];
    0x3F => SetWarpPlace, "setwarpplace %#x %#x %#x %#x %#x", [Byte, Byte, Byte, Word, Word];
    0x40 => Warp4, "warp4 (bank=%d,map=%d) warp#%d (x=%d,y=%d)", [Byte, Byte, Byte, ByteOrVar, ByteOrVar];
    0x41 => Warp5, "warp5 (bank=%d,map=%d) warp#%d (x=%d,y=%d)", [Byte, Byte, Byte, ByteOrVar, ByteOrVar];
    0x42 => GetPlayerPos, "getplayerpos %#x %#x", [Var, Var];
    0x43 => CountPokemon, "countpokemon", [];
    0x44 => AddItem, "additem %#x %#x", [WordOrVar, ByteOrVar];
    0x45 => RemoveItem, "removeitem %#x %#x", [WordOrVar, ByteOrVar];
    0x46 => CheckItemRoom, "checkitemroom %#x %#x", [WordOrVar, ByteOrVar];
    0x47 => CheckItem, "checkitem %#x %#x", [WordOrVar, ByteOrVar];
    0x48 => CheckItemType, "checkitemtype %#x", [WordOrVar];
    0x49 => AddPcItem, "addpcitem %#x %#x", [WordOrVar, WordOrVar];
    0x4A => CheckPcItem, "checkpcitem %#x %#x", [WordOrVar, WordOrVar];
    0x4B => AddDecoration, "adddecoration %#x", [WordOrVar];
    0x4C => RemoveDecoration, "removedecoration %#x", [WordOrVar];
    0x4D => TestDecoration, "testdecoration %#x", [WordOrVar];
    0x4E => CheckDecoration, "checkdecoration %#x", [WordOrVar];
    0x4F => ApplyMovement, "applymovement %#x 0x%08x", [ByteOrVar, Ptr];
    0x50 => ApplyMovementPos, "applymovementpos %#x 0x%08x", [Word, Ptr];
    0x51 => WaitMovement, "waitmovement %#x", [ByteOrVar];
    0x52 => WaitMovementPos, "waitmovementpos %#x %#x %#x", [ByteOrVar, Byte, Byte];
    0x53 => HideSprite, "hidesprite %#x", [ByteOrVar];
    0x54 => HideSpritePos, "hidespritepos %#x %#x %#x", [ByteOrVar, Byte, Byte];
    0x55 => ShowSprite, "showsprite %#x", [ByteOrVar];
    0x56 => ShowSpritePos, "showspritepos %#x %#x %#x", [ByteOrVar, Byte, Byte];
    0x5A => FacePlayer, "faceplayer", [];
    0x5C => TrainerBattle, "trainerbattle", [Byte, Word, Word, Ptr, Ptr];
    0x5D => RepeatTrainerBattle, "repeattrainerbattle", [];
    0x60 => CheckTrainerFlag, "checktrainerflag %#x", [WordOrVar];
    0x61 => ClearTrainerFlag, "cleartrainerflag %#x", [WordOrVar];
    0x62 => SetTrainerFlag, "settrainerflag %#x", [WordOrVar];
    0x63 => MoveSprite2, "movesprite2 %d %d %d", [Word, Word, Word];
    0x64 => MoveOffscreen, "moveoffscreen %#x", [Word];
    0x65 => SpriteBehave, "spritebehave %d %d", [Word, Byte];
    0x66 => WaitMsg, "waitmsg", [];
    0x67 => PrepareMsg, "preparemsg %#x", [PtrOrBank0];
    0x68 => CloseOnKeypress, "closeonkeypress", [];
    0x69 => LockAll, "lockall", [];
    0x6A => Lock, "lock", [];
    0x6B => ReleaseAll, "releaseall", [];
    0x6C => Release, "release", [];
    0x6D => WaitKeypress, "waitkeypress", [];
    0x6E => YesNoBox, "yesnobox %#x %#x", [Byte, Byte];
    0x6F => Multichoice, "multichoice %#x %#x %#x %#x", [Byte, Byte, Byte, Byte];
    0x70 => Multichoice2, "multichoice2 %#x %#x %#x %#x %#x", [Byte, Byte, Byte, Byte, Byte];
    0x71 => Multichoice3, "multichoice3 %#x %#x %#x %#x %#x", [Byte, Byte, Byte, Byte, Byte];
    0x75 => ShowPokePic, "showpokepic %#x %#x %#x", [WordOrVar, Byte, Byte];
    0x76 => HidePokePic, "hidepokepic", [];
    0x77 => ShowContestWinner, "showcontestwinner %#x", [Byte];
    0x78 => Braille, "braille %#x", [PtrOrBank0];
    0x79 => GivePokemon, "givepokemon %#x %#x %#x %#x %#x %#x", [WordOrVar, Byte, Word, Dword, Dword, Byte];
    0x7C => CheckAttack, "checkattack %#x", [Word];
    0x7D => BufferPokemon, "bufferpokemon %d %#x", [Buffer, WordOrVar];
    0x7E => BufferFirstPokemon, "bufferfirstpokemon %d", [Buffer];
    0x7F => BufferPartyPokemon, "bufferpartypokemon %d %#x", [Buffer, WordOrVar];
    0x80 => BufferItem, "bufferitem %d %#x", [Buffer, WordOrVar];
    0x81 => BufferDecoration, "bufferdecoration %#x", [WordOrVar];
    0x82 => BufferAttack, "bufferattack %d %#x", [Buffer, WordOrVar];
    0x83 => BufferNumber, "buffernumber %d %#x", [Buffer, WordOrVar];
    0x84 => BufferStd, "bufferstd %d %#x", [Buffer, WordOrVar];
    0x85 => BufferString, "bufferstring %d 0x%08x", [Buffer, Ptr];
    0x86 => PokeMart, "pokemart 0x%08x", [Ptr];
    0x87 => PokeMart2, "pokemart2 0x%08x", [Ptr];
    0x88 => PokeMart3, "pokemart3 0x%08x", [Ptr];
    0x8A => Cmd8A, "cmd8a", [];
    0x8B => ChooseContestPkmn, "choosecontestpkmn", [];
    0x8C => StartContest, "startcontest", [];
    0x8D => ShowContestResults, "showcontestresults", [];
    0x8E => ContestLinkTransfer, "contestlinktransfer", [];
    0x8F => Random, "random %#x", [WordOrVar];
    0x90 => GiveMoney, "givemoney %#x %#x", [Dword, Byte];
    0x91 => PayMoney, "paymoney %#x %#x", [Dword, Byte];
    0x92 => CheckMoney, "checkmoney %#x %#x", [Dword, Byte];
    0x93 => ShowMoney, "showmoney %#x %#x", [Byte, Byte];
    0x94 => HideMoney, "hidemoney %#x %#x", [Byte, Byte];
    0x95 => UpdateMoney, "updatemoney %#x %#x", [Byte, Byte];
    0x96 => Cmd96, "cmd96", [];
    0x97 => FadeScreen, "fadescreen %#x", [Byte];
    0x9C => DoAnimation, "doanimation %#x", [Word];
    0x9D => SetAnimation, "setanimation %#x %#x", [Byte, WordOrVar];
    0x9E => CheckAnimation, "checkanimation %#x", [Word];
    0x9F => SetHealingPlace, "sethealingplace %#x", [Word];
    0xA0 => CheckGender, "checkgender", [];
    0xA1 => Cry, "cry %#x %#x", [WordOrVar, Word];
    0xA2 => SetMapTile, "setmaptile %#x %#x %#x %#x", [Word, Word, Word, Word];
    0xA3 => ResetWeather, "resetweather", [];
    0xA4 => SetWeather, "setweather %#x", [Word];
    0xA5 => DoWeather, "doweather", [];
    0xA6 => CmdA6, "cmda6 %#x", [Byte];
    0xAC => SetDoorOpened, "setdooropened %#x %#x", [Word, Word];
    0xAD => SetDoorClosed, "setdoorclosed %#x %#x", [Word, Word];
    0xAE => DoorChange, "doorchange", [];
    0xAF => SetDoorOpened2, "setdooropened2 %#x %#x", [Word, Word];
    0xB0 => SetDoorClosed2, "setdoorclosed2 %#x %#x", [Word, Word];
    0xB1 => CmdB1, "cmdb1", [];
    0xB2 => CmdB2, "cmdb2", [];
    0xB6 => SetWildBattle, "setwildbattle %#x %#x %#x", [Word, Byte, Word];
    0xB7 => DoWildBattle, "dowildbattle", [];
    0xC0 => ShowCoins, "showcoins %#x %#x", [Byte, Byte];
    0xC1 => HideCoins, "hidecoins", [];
    0xC2 => UpdateCoins, "updatecoins %#x %#x", [Byte, Byte];
    0xC3 => CmdC3, "cmdc3 %d", [Hidden];
    0xC4 => Warp6, "warp6", [];
    0xC5 => WaitCry, "waitcry", [];
    0xC6 => BufferBoxName, "bufferboxname %d %#x", [Buffer, WordOrVar];
    0xC7 => TextColor, "textcolor %#x", [Byte];
    0xC8 => CmdC8, "cmdc8 %#x", [PtrOrBank0];
    0xC9 => CmdC9, "cmdc9", [];
    0xCA => SignMsg, "signmsg", [];
    0xCB => NormalMsg, "normalmsg", [];
    0xCC => CompareHiddenVar, "comparehiddenvar %d %#x", [Hidden, Dword];
    0xCD => SetObedience, "setobedience %#x", [Word];
    0xCE => CheckObedience, "checkobedience %#x", [WordOrVar];
    0xCF => ExecuteRam, "executeram", [];
    0xD0 => SetWorldMapFlag, "setworldmapflag %#x", [FlagOrVar];
    0xD1 => WarpTeleport2, "warpteleport2", [];
    0xD2 => SetCatchLocation, "setcatchlocation %#x %#x", [WordOrVar, Byte];
    0xD3 => Braille2, "braille2 %#x", [PtrOrBank0];
    0xD4 => BufferItems, "bufferitems %d %#x %#x", [Buffer, WordOrVar, WordOrVar];
    0xD5 => CmdD5, "cmdd5", [];
}

/// Look up the descriptor registered for an opcode byte
pub fn command(opcode: u8) -> Option<&'static Command> {
    TABLE[opcode as usize].as_ref()
}

/// Number of registered opcodes
pub fn registered_count() -> usize {
    TABLE.iter().filter(|c| c.is_some()).count()
}

/// Trainer battle variants, keyed by the discriminant byte after the opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleKind {
    Single,
    ContinueScriptNoMusic,
    ContinueScript,
    SingleNoIntroText,
    Double,
    Rematch,
    ContinueScriptDouble,
    RematchDouble,
    ContinueScriptDoubleNoMusic,
    EarlyRival,
}

impl BattleKind {
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => BattleKind::ContinueScriptNoMusic,
            2 => BattleKind::ContinueScript,
            3 => BattleKind::SingleNoIntroText,
            4 => BattleKind::Double,
            5 => BattleKind::Rematch,
            6 => BattleKind::ContinueScriptDouble,
            7 => BattleKind::RematchDouble,
            8 => BattleKind::ContinueScriptDoubleNoMusic,
            9 => BattleKind::EarlyRival,
            _ => BattleKind::Single,
        }
    }

    /// Operand list for this variant (kind, trainer, local id, pointers...)
    pub fn args(&self) -> &'static [Arg] {
        use Arg::*;
        match self {
            BattleKind::Single | BattleKind::Rematch | BattleKind::EarlyRival => {
                &[Byte, Word, Word, Ptr, Ptr]
            }
            BattleKind::SingleNoIntroText => &[Byte, Word, Word, Ptr],
            BattleKind::ContinueScriptNoMusic
            | BattleKind::ContinueScript
            | BattleKind::Double
            | BattleKind::RematchDouble => &[Byte, Word, Word, Ptr, Ptr, Ptr],
            BattleKind::ContinueScriptDouble | BattleKind::ContinueScriptDoubleNoMusic => {
                &[Byte, Word, Word, Ptr, Ptr, Ptr, Ptr]
            }
        }
    }

    /// Operand index of the script run after winning, if any
    pub fn continue_operand(&self) -> Option<usize> {
        match self {
            BattleKind::ContinueScriptNoMusic | BattleKind::ContinueScript => Some(5),
            BattleKind::ContinueScriptDouble | BattleKind::ContinueScriptDoubleNoMusic => Some(6),
            _ => None,
        }
    }

    /// Operand index of the script run when the party is too small
    pub fn not_enough_operand(&self) -> Option<usize> {
        match self {
            BattleKind::Double
            | BattleKind::RematchDouble
            | BattleKind::ContinueScriptDouble
            | BattleKind::ContinueScriptDoubleNoMusic => Some(5),
            _ => None,
        }
    }
}

/// Comparison operators used by conditional opcodes
pub fn compare(operator: u8, a: u32, b: u32) -> Option<bool> {
    match operator {
        0 => Some(a < b),
        1 => Some(a == b),
        2 => Some(a > b),
        3 => Some(a <= b),
        4 => Some(a >= b),
        5 => Some(a != b),
        _ => None,
    }
}

/// Symbol for a comparison operator in listings
pub fn operator_symbol(operator: u8) -> &'static str {
    ["<", "==", ">", "<=", ">=", "!=", "?"][operator.min(6) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_full_instruction_set() {
        assert!(registered_count() >= 180);
        assert!(command(0x57).is_none());
        assert!(command(0xFF).is_none());
        let cmd = command(0x06).unwrap();
        assert_eq!(cmd.op, Op::If1);
        assert_eq!(cmd.name(), "if1");
        assert_eq!(cmd.size(), 6);
    }

    #[test]
    fn test_descriptor_opcode_matches_slot() {
        for byte in 0..=255u8 {
            if let Some(cmd) = command(byte) {
                assert_eq!(cmd.opcode, byte);
            }
        }
    }

    #[test]
    fn test_battle_variants() {
        assert_eq!(BattleKind::from_byte(3).args().len(), 4);
        assert_eq!(BattleKind::from_byte(6).args().len(), 7);
        assert_eq!(BattleKind::from_byte(2).continue_operand(), Some(5));
        assert_eq!(BattleKind::from_byte(0).continue_operand(), None);
        assert_eq!(BattleKind::from_byte(0x42), BattleKind::Single);
    }

    #[test]
    fn test_compare_operators() {
        assert_eq!(compare(0, 1, 2), Some(true));
        assert_eq!(compare(1, 2, 2), Some(true));
        assert_eq!(compare(5, 2, 2), Some(false));
        assert_eq!(compare(6, 2, 2), None);
        assert_eq!(operator_symbol(9), "?");
    }
}
