// ============ Object IDs ============
// All IDs are plain u32 indices into the per-type arenas.
// They are small enough to embed directly in a LuaValue.

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[repr(transparent)]
pub struct StringId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[repr(transparent)]
pub struct TableId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[repr(transparent)]
pub struct ProtoId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[repr(transparent)]
pub struct FunctionId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[repr(transparent)]
pub struct UpvalueId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[repr(transparent)]
pub struct UserdataId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[repr(transparent)]
pub struct ThreadId(pub u32);

/// Unified GC object identifier. The collector traverses objects
/// generically through this sum; everything else uses the typed ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum GcId {
    String(StringId),
    Table(TableId),
    Proto(ProtoId),
    Function(FunctionId),
    Upvalue(UpvalueId),
    Userdata(UserdataId),
    Thread(ThreadId),
}

impl GcId {
    #[inline(always)]
    pub fn index(self) -> u32 {
        match self {
            GcId::String(StringId(i)) => i,
            GcId::Table(TableId(i)) => i,
            GcId::Proto(ProtoId(i)) => i,
            GcId::Function(FunctionId(i)) => i,
            GcId::Upvalue(UpvalueId(i)) => i,
            GcId::Userdata(UserdataId(i)) => i,
            GcId::Thread(ThreadId(i)) => i,
        }
    }
}

impl From<StringId> for GcId {
    fn from(id: StringId) -> Self {
        GcId::String(id)
    }
}

impl From<TableId> for GcId {
    fn from(id: TableId) -> Self {
        GcId::Table(id)
    }
}

impl From<ProtoId> for GcId {
    fn from(id: ProtoId) -> Self {
        GcId::Proto(id)
    }
}

impl From<FunctionId> for GcId {
    fn from(id: FunctionId) -> Self {
        GcId::Function(id)
    }
}

impl From<UpvalueId> for GcId {
    fn from(id: UpvalueId) -> Self {
        GcId::Upvalue(id)
    }
}

impl From<UserdataId> for GcId {
    fn from(id: UserdataId) -> Self {
        GcId::Userdata(id)
    }
}

impl From<ThreadId> for GcId {
    fn from(id: ThreadId) -> Self {
        GcId::Thread(id)
    }
}
