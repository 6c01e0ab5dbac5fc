/// Operating-system specifics of the emitted NASM assembly.
pub trait Env {
    const ENTRY_POINT: &str;

    const SECTION_TEXT: &str;
    const SECTION_READ_ONLY_DATA: &str;

    /// Value loaded into `rax` before `syscall` to write to a descriptor.
    const SYS_WRITE: &str;
    /// Value loaded into `rax` before `syscall` to terminate the process.
    const SYS_EXIT: &str;
}

impl Env for Darwin {
    const ENTRY_POINT: &str = "_main";

    const SECTION_TEXT: &str = ".text";
    const SECTION_READ_ONLY_DATA: &str = ".rodata";

    const SYS_WRITE: &str = "0x2000004";
    const SYS_EXIT: &str = "0x2000001";
}

impl Env for Linux {
    const ENTRY_POINT: &str = "_start";

    const SECTION_TEXT: &str = ".text";
    const SECTION_READ_ONLY_DATA: &str = ".rodata";

    const SYS_WRITE: &str = "1";
    const SYS_EXIT: &str = "60";
}

pub struct Darwin;

pub struct Linux;
