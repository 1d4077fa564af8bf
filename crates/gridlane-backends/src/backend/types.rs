//! Element kinds, scalar arguments and dispatch shapes shared by every driver

use std::fmt;

use super::traits::DeviceBuffer;

/// Closed set of element types a buffer can hold and a scalar argument can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F16,
    F32,
    F64,
}

impl ElementKind {
    /// Every supported kind, narrowest integers first.
    pub const ALL: [ElementKind; 11] = [
        ElementKind::I8,
        ElementKind::I16,
        ElementKind::I32,
        ElementKind::I64,
        ElementKind::U8,
        ElementKind::U16,
        ElementKind::U32,
        ElementKind::U64,
        ElementKind::F16,
        ElementKind::F32,
        ElementKind::F64,
    ];

    /// Width of one element in bytes
    pub const fn size_bytes(self) -> usize {
        match self {
            ElementKind::I8 | ElementKind::U8 => 1,
            ElementKind::I16 | ElementKind::U16 | ElementKind::F16 => 2,
            ElementKind::I32 | ElementKind::U32 | ElementKind::F32 => 4,
            ElementKind::I64 | ElementKind::U64 | ElementKind::F64 => 8,
        }
    }

    /// Kernel-language spelling (Metal Shading Language names)
    pub const fn kernel_type_name(self) -> &'static str {
        match self {
            ElementKind::I8 => "char",
            ElementKind::I16 => "short",
            ElementKind::I32 => "int",
            ElementKind::I64 => "long",
            ElementKind::U8 => "uchar",
            ElementKind::U16 => "ushort",
            ElementKind::U32 => "uint",
            ElementKind::U64 => "ulong",
            ElementKind::F16 => "half",
            ElementKind::F32 => "float",
            ElementKind::F64 => "double",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::I8 => "i8",
            ElementKind::I16 => "i16",
            ElementKind::I32 => "i32",
            ElementKind::I64 => "i64",
            ElementKind::U8 => "u8",
            ElementKind::U16 => "u16",
            ElementKind::U32 => "u32",
            ElementKind::U64 => "u64",
            ElementKind::F16 => "f16",
            ElementKind::F32 => "f32",
            ElementKind::F64 => "f64",
        };
        f.write_str(name)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Host types that map onto an [`ElementKind`].
///
/// Sealed: buffer views reinterpret raw device memory as `[T]`, which is only
/// sound for the plain-old-data types listed here.
pub trait Element: bytemuck::Pod + Send + Sync + sealed::Sealed {
    const KIND: ElementKind;
}

macro_rules! impl_element {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Element for $ty {
                const KIND: ElementKind = ElementKind::$kind;
            }

            impl From<$ty> for Scalar {
                fn from(value: $ty) -> Self {
                    Scalar::$kind(value)
                }
            }
        )*
    };
}

/// A fixed-width constant passed to a kernel by value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F16(half::f16),
    F32(f32),
    F64(f64),
}

impl_element! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    half::f16 => F16,
    f32 => F32,
    f64 => F64,
}

impl Scalar {
    pub fn kind(&self) -> ElementKind {
        match self {
            Scalar::I8(_) => ElementKind::I8,
            Scalar::I16(_) => ElementKind::I16,
            Scalar::I32(_) => ElementKind::I32,
            Scalar::I64(_) => ElementKind::I64,
            Scalar::U8(_) => ElementKind::U8,
            Scalar::U16(_) => ElementKind::U16,
            Scalar::U32(_) => ElementKind::U32,
            Scalar::U64(_) => ElementKind::U64,
            Scalar::F16(_) => ElementKind::F16,
            Scalar::F32(_) => ElementKind::F32,
            Scalar::F64(_) => ElementKind::F64,
        }
    }

    /// Raw native-endian bytes, exactly as the kernel sees them
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Scalar::I8(v) => bytemuck::bytes_of(v),
            Scalar::I16(v) => bytemuck::bytes_of(v),
            Scalar::I32(v) => bytemuck::bytes_of(v),
            Scalar::I64(v) => bytemuck::bytes_of(v),
            Scalar::U8(v) => bytemuck::bytes_of(v),
            Scalar::U16(v) => bytemuck::bytes_of(v),
            Scalar::U32(v) => bytemuck::bytes_of(v),
            Scalar::U64(v) => bytemuck::bytes_of(v),
            Scalar::F16(v) => bytemuck::bytes_of(v),
            Scalar::F32(v) => bytemuck::bytes_of(v),
            Scalar::F64(v) => bytemuck::bytes_of(v),
        }
    }
}

/// Number of threads along each axis of a dispatch.
///
/// Every axis is at least 1 once it reaches a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridDim {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl GridDim {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Create 1D grid
    pub const fn linear(size: u32) -> Self {
        Self { x: size, y: 1, z: 1 }
    }

    /// Total number of threads
    pub const fn total_threads(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

impl Default for GridDim {
    fn default() -> Self {
        Self { x: 1, y: 1, z: 1 }
    }
}

impl fmt::Display for GridDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Shape of one execution group (threads per group along each axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupDim {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl GroupDim {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Threads in one group
    pub const fn total_lanes(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// Groups needed along each axis so that every grid position is covered.
    /// The last group on an axis may be partially outside the grid.
    pub fn groups_to_cover(&self, grid: GridDim) -> GridDim {
        GridDim {
            x: grid.x.div_ceil(self.x.max(1)),
            y: grid.y.div_ceil(self.y.max(1)),
            z: grid.z.div_ceil(self.z.max(1)),
        }
    }
}

impl Default for GroupDim {
    fn default() -> Self {
        Self { x: 1, y: 1, z: 1 }
    }
}

impl fmt::Display for GroupDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Execution limits a pipeline reports for its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineLimits {
    /// Lanes that execute in true lockstep (SIMD width)
    pub lockstep_width: u32,
    /// Maximum threads that may share one execution group
    pub max_threads_per_group: u32,
}

/// One bound kernel argument.
#[derive(Clone, Copy)]
pub enum Argument<'a> {
    /// Passed by value
    Bytes(&'a [u8]),
    /// Passed by reference to shared memory
    Buffer(&'a dyn DeviceBuffer),
}

impl fmt::Debug for Argument<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Argument::Buffer(buffer) => f.debug_tuple("Buffer").field(&buffer.len_bytes()).finish(),
        }
    }
}

/// Everything a queue needs to run one dispatch.
///
/// `arguments[i]` binds to argument slot `i` of the kernel.
#[derive(Debug, Clone, Copy)]
pub struct Dispatch<'a> {
    pub grid: GridDim,
    pub group: GroupDim,
    pub arguments: &'a [Argument<'a>],
}
