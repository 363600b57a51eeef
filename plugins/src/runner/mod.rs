pub mod codecli;

pub use codecli::CodeCliRunnerPlugin;
