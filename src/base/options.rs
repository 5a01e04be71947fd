//! Option bitmasks accepted by editing-domain operations.

bitflags::bitflags! {
    /// Options for creating, loading, saving and unloading resources.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceOptions: u32 {
        /// The path argument already is a URI; do not convert it from a file path.
        const AS_URI = 0x0001;
        /// Save even if the store reports the target as read-only.
        const OVERWRITE_READONLY = 0x0002;
        /// Skip features the schema does not know instead of failing.
        const COMPATIBILITY_MODE = 0x0004;
        /// Encode every unit before writing any of them.
        const USE_FILE_BUFFER = 0x0008;
        /// Read every unit of a logical resource during the load.
        const LOAD_ALL_UNITS = 0x0010;
        /// Leave separate elements as unloaded stand-ins after the load.
        const DONT_AUTO_LOAD_UNITS = 0x0020;
    }
}

bitflags::bitflags! {
    /// Options for running an action.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RunOptions: u32 {
        /// Do not publish notifications for this action.
        const SILENT = 0x0001;
        /// Do not run validators when the action completes.
        const UNVALIDATED = 0x0002;
        /// Do not run semantic procedures when the action completes.
        const NO_SEM_PROCS = 0x0004;
        /// Run outside of any undo interval.
        const UNCHECKED = 0x0008;
    }
}

bitflags::bitflags! {
    /// Options for destroying an object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DestroyOptions: u32 {
        /// Raise no destroy notifications.
        const NO_EVENTS = 0x0001;
        /// Leave references to the destroyed objects in place.
        const KEEP_REFERENCES = 0x0002;
        /// Keep a proxy under the same id so references still resolve.
        const MAKE_PROXY = 0x0004;
    }
}
