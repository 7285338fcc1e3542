pub type FlowId = u32;

#[derive(Debug, Default, Clone, Copy)]
pub struct FlowCounters {
    pub received: u64,
    pub recovered: u64,
    pub lost: u64,
    pub reordered: u64,
}
