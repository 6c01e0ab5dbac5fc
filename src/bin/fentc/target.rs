#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Target {
    #[value(name = "linux")]
    x86_64_linux,
    #[value(name = "darwin")]
    x86_64_darwin,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&fent::codegen::Target::from(*self), f)
    }
}

impl From<Target> for fent::codegen::Target {
    fn from(value: Target) -> Self {
        match value {
            Target::x86_64_linux => fent::codegen::Target::x86_64_linux,
            Target::x86_64_darwin => fent::codegen::Target::x86_64_darwin,
        }
    }
}
