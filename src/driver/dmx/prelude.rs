// dmx channel value type
pub type DmxValue = u8;
// dmx channel address type, valid addresses are 1..=512
pub type DmxChannel = u16;
// number of channels in one universe
pub const DMX_CHANNEL_LEN: usize = 512;
// full frame length, start code plus channels
pub const DMX_FRAME_LEN: usize = DMX_CHANNEL_LEN + 1;
