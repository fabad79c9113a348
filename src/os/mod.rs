mod traits;

pub use traits::Mapper;

cfg_if::cfg_if! {
    if #[cfg(windows)]{
        pub(crate) mod windows;
        pub use windows::TwoStepMapper;
        pub(crate) use windows::RawResource;
        /// The mapper for the build target.
        pub type DefaultMapper = TwoStepMapper;
    }else if #[cfg(unix)]{
        pub(crate) mod unix;
        pub use unix::SingleCallMapper;
        pub(crate) use unix::RawResource;
        /// The mapper for the build target.
        pub type DefaultMapper = SingleCallMapper;
    }else {
        compile_error!("unsupported target: pmem_map needs a Unix or Windows host");
    }
}
