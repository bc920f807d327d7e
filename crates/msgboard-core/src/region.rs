//! Screen region model
//!
//! The display is divided into eight fixed, non-overlapping rectangles.
//! Each region tracks the colors and text it currently shows plus a dirty
//! flag, so the renderer only repaints what changed.
//!
//! # Ownership partition
//!
//! Every region belongs to exactly one subsystem ([`Owner`]). Writes are
//! only possible through a [`Partition`], and a partition only accepts the
//! region ids of its own group type. The clock can therefore never write a
//! message region, and vice versa, without any runtime check:
//!
//! | Owner   | Regions                                 |
//! |---------|-----------------------------------------|
//! | Clock   | ClockHourMinute, ClockSeconds           |
//! | Message | MainMessage, SubMessage, ErrorBar       |
//! | Input   | StatusBar, ButtonBar                    |
//! | Link    | EnvInfo                                 |

use alloc::string::String;
use core::marker::PhantomData;

use embedded_graphics::geometry::{Point, Size};
use embedded_graphics::primitives::Rectangle;

use crate::color::ColorValue;

/// Number of regions on screen.
pub const REGION_COUNT: usize = 8;

/// Fixed region identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    EnvInfo,
    ClockHourMinute,
    ClockSeconds,
    MainMessage,
    SubMessage,
    StatusBar,
    ErrorBar,
    ButtonBar,
}

impl Region {
    pub const ALL: [Region; REGION_COUNT] = [
        Region::EnvInfo,
        Region::ClockHourMinute,
        Region::ClockSeconds,
        Region::MainMessage,
        Region::SubMessage,
        Region::StatusBar,
        Region::ErrorBar,
        Region::ButtonBar,
    ];

    const fn index(self) -> usize {
        self as usize
    }

    /// Pixel rectangle of this region, fixed for the lifetime of the device.
    pub const fn bounds(self) -> Rectangle {
        let (x, y, w, h) = match self {
            Region::EnvInfo => (0, 0, 320, 20),
            Region::ClockHourMinute => (0, 20, 230, 30),
            Region::ClockSeconds => (230, 20, 90, 30),
            Region::MainMessage => (0, 50, 320, 80),
            Region::SubMessage => (0, 130, 320, 70),
            Region::ErrorBar => (0, 200, 320, 20),
            Region::StatusBar => (0, 220, 320, 15),
            Region::ButtonBar => (0, 235, 320, 5),
        };
        Rectangle::new(Point::new(x, y), Size::new(w, h))
    }

    /// The only subsystem allowed to write this region.
    pub const fn owner(self) -> Owner {
        match self {
            Region::ClockHourMinute | Region::ClockSeconds => Owner::Clock,
            Region::MainMessage | Region::SubMessage | Region::ErrorBar => Owner::Message,
            Region::StatusBar | Region::ButtonBar => Owner::Input,
            Region::EnvInfo => Owner::Link,
        }
    }
}

/// Subsystems that write to the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Clock,
    Message,
    Input,
    Link,
}

/// A typed subset of [`Region`] belonging to a single [`Owner`].
pub trait RegionGroup: Copy + Into<Region> {
    const OWNER: Owner;
}

/// Regions written by the clock ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockRegion {
    HourMinute,
    Seconds,
}

impl From<ClockRegion> for Region {
    fn from(value: ClockRegion) -> Self {
        match value {
            ClockRegion::HourMinute => Region::ClockHourMinute,
            ClockRegion::Seconds => Region::ClockSeconds,
        }
    }
}

impl RegionGroup for ClockRegion {
    const OWNER: Owner = Owner::Clock;
}

/// Regions written by the status message handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRegion {
    Main,
    Sub,
    Error,
}

impl From<MessageRegion> for Region {
    fn from(value: MessageRegion) -> Self {
        match value {
            MessageRegion::Main => Region::MainMessage,
            MessageRegion::Sub => Region::SubMessage,
            MessageRegion::Error => Region::ErrorBar,
        }
    }
}

impl RegionGroup for MessageRegion {
    const OWNER: Owner = Owner::Message;
}

/// Regions written on button input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRegion {
    StatusBar,
    ButtonBar,
}

impl From<InputRegion> for Region {
    fn from(value: InputRegion) -> Self {
        match value {
            InputRegion::StatusBar => Region::StatusBar,
            InputRegion::ButtonBar => Region::ButtonBar,
        }
    }
}

impl RegionGroup for InputRegion {
    const OWNER: Owner = Owner::Input;
}

/// Regions written by the connectivity routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRegion {
    EnvInfo,
}

impl From<LinkRegion> for Region {
    fn from(_: LinkRegion) -> Self {
        Region::EnvInfo
    }
}

impl RegionGroup for LinkRegion {
    const OWNER: Owner = Owner::Link;
}

/// What a region currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Content {
    /// Nothing written since startup.
    Blank,
    /// Solid background fill.
    Fill,
    /// Text over a background.
    Text,
}

/// Last-known state of a single region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionState {
    pub foreground: ColorValue,
    pub background: ColorValue,
    pub text: String,
    pub content: Content,
}

impl Default for RegionState {
    fn default() -> Self {
        Self {
            foreground: ColorValue::WHITE,
            background: ColorValue::BLACK,
            text: String::new(),
            content: Content::Blank,
        }
    }
}

/// Small bit set of regions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionSet(u8);

impl RegionSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(u8::MAX)
    }

    pub fn insert(&mut self, region: Region) {
        self.0 |= 1 << region.index();
    }

    pub fn contains(&self, region: Region) -> bool {
        self.0 & (1 << region.index()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Region> + use<> {
        let set = *self;
        Region::ALL.into_iter().filter(move |r| set.contains(*r))
    }
}

impl FromIterator<Region> for RegionSet {
    fn from_iter<I: IntoIterator<Item = Region>>(iter: I) -> Self {
        let mut set = Self::empty();
        for region in iter {
            set.insert(region);
        }
        set
    }
}

/// Region state for the whole screen.
#[derive(Debug, Clone)]
pub struct ScreenModel {
    regions: [RegionState; REGION_COUNT],
    dirty: RegionSet,
}

impl Default for ScreenModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenModel {
    /// All regions white-on-black and empty, marked dirty for the first paint.
    pub fn new() -> Self {
        Self {
            regions: core::array::from_fn(|_| RegionState::default()),
            dirty: RegionSet::all(),
        }
    }

    /// Current state of a region.
    pub fn get(&self, region: impl Into<Region>) -> &RegionState {
        &self.regions[region.into().index()]
    }

    /// Writer restricted to the regions of group `G`.
    pub fn partition<G: RegionGroup>(&mut self) -> Partition<'_, G> {
        Partition {
            model: self,
            _group: PhantomData,
        }
    }

    /// Regions written since the last call, clearing the set.
    pub fn take_dirty(&mut self) -> RegionSet {
        core::mem::take(&mut self.dirty)
    }

    pub fn dirty(&self) -> RegionSet {
        self.dirty
    }

    /// Force every region to be repainted.
    pub fn mark_all_dirty(&mut self) {
        self.dirty = RegionSet::all();
    }

    fn apply_fill(&mut self, region: Region, background: ColorValue) {
        let state = &mut self.regions[region.index()];
        state.background = background;
        state.text.clear();
        state.content = Content::Fill;
        self.dirty.insert(region);
    }

    fn apply_text(
        &mut self,
        region: Region,
        text: &str,
        foreground: ColorValue,
        background: ColorValue,
    ) {
        let state = &mut self.regions[region.index()];
        state.foreground = foreground;
        state.background = background;
        state.text.clear();
        state.text.push_str(text);
        state.content = Content::Text;
        self.dirty.insert(region);
    }
}

/// Write access to the regions of one [`Owner`].
pub struct Partition<'a, G: RegionGroup> {
    model: &'a mut ScreenModel,
    _group: PhantomData<G>,
}

impl<G: RegionGroup> Partition<'_, G> {
    /// Overwrite the background and clear any text.
    pub fn apply_fill(&mut self, region: G, background: ColorValue) {
        self.model.apply_fill(region.into(), background);
    }

    /// Overwrite both colors and the text.
    pub fn apply_text(
        &mut self,
        region: G,
        text: &str,
        foreground: ColorValue,
        background: ColorValue,
    ) {
        self.model.apply_text(region.into(), text, foreground, background);
    }

    /// Append to the text of a region already holding text, keeping its colors.
    pub fn append_text(&mut self, region: G, suffix: &str) {
        let region = region.into();
        let state = &mut self.model.regions[region.index()];
        state.text.push_str(suffix);
        state.content = Content::Text;
        self.model.dirty.insert(region);
    }
}
