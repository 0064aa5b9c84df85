// SPDX-FileCopyrightText: Copyright (c) 2026 modbuscore contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Register and coil mapping.
//!
//! A map holds non-overlapping regions per entity kind, sorted by start
//! address; lookup is a binary search. A region is backed by storage
//! and/or by read/write hooks; a hook failure surfaces as a server
//! device failure to the remote side.

use crate::frame::{Address, Coil, Exception, Quantity, Word};

/// The four addressable entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    HoldingRegister,
    InputRegister,
    Coil,
    DiscreteInput,
}

impl RegionKind {
    const fn index(self) -> usize {
        match self {
            Self::HoldingRegister => 0,
            Self::InputRegister => 1,
            Self::Coil => 2,
            Self::DiscreteInput => 3,
        }
    }

    /// Whether the kind is writable through the protocol at all.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::HoldingRegister | Self::Coil)
    }
}

/// Hook results carry the exception reported to the remote side.
pub type HookResult<T> = std::result::Result<T, Exception>;

/// Read hook of a register region.
pub type ReadWordHook = Box<dyn FnMut(Address) -> HookResult<Word> + Send>;
/// Write hook of a register region.
pub type WriteWordHook = Box<dyn FnMut(Address, Word) -> HookResult<()> + Send>;
/// Read hook of a bit region.
pub type ReadBitHook = Box<dyn FnMut(Address) -> HookResult<Coil> + Send>;
/// Write hook of a bit region.
pub type WriteBitHook = Box<dyn FnMut(Address, Coil) -> HookResult<()> + Send>;

enum Storage {
    Words(Vec<Word>),
    Bits(Vec<Coil>),
}

/// A contiguous address range of one entity kind.
pub struct Region {
    kind: RegionKind,
    start: Address,
    count: Quantity,
    storage: Storage,
    read_only: bool,
    read_word: Option<ReadWordHook>,
    write_word: Option<WriteWordHook>,
    read_bit: Option<ReadBitHook>,
    write_bit: Option<WriteBitHook>,
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("kind", &self.kind)
            .field("start", &self.start)
            .field("count", &self.count)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl Region {
    fn words(kind: RegionKind, start: Address, values: Vec<Word>) -> Self {
        let count = values.len() as Quantity;
        Self {
            kind,
            start,
            count,
            storage: Storage::Words(values),
            read_only: false,
            read_word: None,
            write_word: None,
            read_bit: None,
            write_bit: None,
        }
    }

    fn bits(kind: RegionKind, start: Address, values: Vec<Coil>) -> Self {
        let count = values.len() as Quantity;
        Self {
            kind,
            start,
            count,
            storage: Storage::Bits(values),
            read_only: false,
            read_word: None,
            write_word: None,
            read_bit: None,
            write_bit: None,
        }
    }

    /// Holding registers starting at `start`, initialized from `values`.
    #[must_use]
    pub fn holding(start: Address, values: Vec<Word>) -> Self {
        Self::words(RegionKind::HoldingRegister, start, values)
    }

    /// Input registers starting at `start`, initialized from `values`.
    #[must_use]
    pub fn input(start: Address, values: Vec<Word>) -> Self {
        Self::words(RegionKind::InputRegister, start, values)
    }

    /// Coils starting at `start`, initialized from `values`.
    #[must_use]
    pub fn coils(start: Address, values: Vec<Coil>) -> Self {
        Self::bits(RegionKind::Coil, start, values)
    }

    /// Discrete inputs starting at `start`, initialized from `values`.
    #[must_use]
    pub fn discrete(start: Address, values: Vec<Coil>) -> Self {
        Self::bits(RegionKind::DiscreteInput, start, values)
    }

    /// Reject protocol writes to this region with an illegal data
    /// address exception.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Serve reads through a hook instead of the stored values.
    #[must_use]
    pub fn on_read_word(mut self, hook: ReadWordHook) -> Self {
        self.read_word = Some(hook);
        self
    }

    /// Apply writes through a hook instead of the stored values.
    #[must_use]
    pub fn on_write_word(mut self, hook: WriteWordHook) -> Self {
        self.write_word = Some(hook);
        self
    }

    /// Serve bit reads through a hook instead of the stored values.
    #[must_use]
    pub fn on_read_bit(mut self, hook: ReadBitHook) -> Self {
        self.read_bit = Some(hook);
        self
    }

    /// Apply bit writes through a hook instead of the stored values.
    #[must_use]
    pub fn on_write_bit(mut self, hook: WriteBitHook) -> Self {
        self.write_bit = Some(hook);
        self
    }

    #[must_use]
    pub const fn kind(&self) -> RegionKind {
        self.kind
    }

    #[must_use]
    pub const fn start(&self) -> Address {
        self.start
    }

    #[must_use]
    pub const fn count(&self) -> Quantity {
        self.count
    }

    /// One past the last contained address.
    fn end(&self) -> u32 {
        u32::from(self.start) + u32::from(self.count)
    }

    fn contains(&self, address: Address) -> bool {
        address >= self.start && u32::from(address) < self.end()
    }

    fn overlaps(&self, other: &Self) -> bool {
        u32::from(self.start) < other.end() && u32::from(other.start) < self.end()
    }

    fn get_word(&mut self, address: Address) -> HookResult<Word> {
        if let Some(hook) = &mut self.read_word {
            return hook(address);
        }
        match &self.storage {
            Storage::Words(values) => Ok(values[usize::from(address - self.start)]),
            Storage::Bits(_) => Err(Exception::ServerDeviceFailure),
        }
    }

    fn set_word(&mut self, address: Address, value: Word) -> HookResult<()> {
        if self.read_only {
            return Err(Exception::IllegalDataAddress);
        }
        if let Some(hook) = &mut self.write_word {
            return hook(address, value);
        }
        match &mut self.storage {
            Storage::Words(values) => {
                values[usize::from(address - self.start)] = value;
                Ok(())
            }
            Storage::Bits(_) => Err(Exception::ServerDeviceFailure),
        }
    }

    fn get_bit(&mut self, address: Address) -> HookResult<Coil> {
        if let Some(hook) = &mut self.read_bit {
            return hook(address);
        }
        match &self.storage {
            Storage::Bits(values) => Ok(values[usize::from(address - self.start)]),
            Storage::Words(_) => Err(Exception::ServerDeviceFailure),
        }
    }

    fn set_bit(&mut self, address: Address, value: Coil) -> HookResult<()> {
        if self.read_only {
            return Err(Exception::IllegalDataAddress);
        }
        if let Some(hook) = &mut self.write_bit {
            return hook(address, value);
        }
        match &mut self.storage {
            Storage::Bits(values) => {
                values[usize::from(address - self.start)] = value;
                Ok(())
            }
            Storage::Words(_) => Err(Exception::ServerDeviceFailure),
        }
    }
}

/// The address-sorted region tables of a server.
#[derive(Debug, Default)]
pub struct RegisterMap {
    // One sorted table per kind.
    tables: [Vec<Region>; 4],
}

impl RegisterMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a region.
    ///
    /// Regions of the same kind must not overlap; the table stays sorted
    /// by start address.
    pub fn add(&mut self, region: Region) -> Result<(), Region> {
        let table = &mut self.tables[region.kind.index()];
        if table.iter().any(|existing| existing.overlaps(&region)) {
            return Err(region);
        }
        let at = table.partition_point(|existing| existing.start < region.start);
        table.insert(at, region);
        Ok(())
    }

    fn lookup_mut(&mut self, kind: RegionKind, address: Address) -> Option<&mut Region> {
        let table = &mut self.tables[kind.index()];
        let idx = table.partition_point(|region| region.end() <= u32::from(address));
        table
            .get_mut(idx)
            .filter(|region| region.contains(address))
    }

    /// Read `quantity` registers starting at `start` into `out`.
    pub fn read_words(
        &mut self,
        kind: RegionKind,
        start: Address,
        quantity: Quantity,
        out: &mut Vec<Word>,
    ) -> HookResult<()> {
        out.clear();
        for offset in 0..quantity {
            let address = start.checked_add(offset).ok_or(Exception::IllegalDataAddress)?;
            let region = self
                .lookup_mut(kind, address)
                .ok_or(Exception::IllegalDataAddress)?;
            out.push(region.get_word(address)?);
        }
        Ok(())
    }

    /// Read `quantity` bits starting at `start` into `out`.
    pub fn read_bits(
        &mut self,
        kind: RegionKind,
        start: Address,
        quantity: Quantity,
        out: &mut Vec<Coil>,
    ) -> HookResult<()> {
        out.clear();
        for offset in 0..quantity {
            let address = start.checked_add(offset).ok_or(Exception::IllegalDataAddress)?;
            let region = self
                .lookup_mut(kind, address)
                .ok_or(Exception::IllegalDataAddress)?;
            out.push(region.get_bit(address)?);
        }
        Ok(())
    }

    /// Write one holding register.
    pub fn write_word(&mut self, address: Address, value: Word) -> HookResult<()> {
        let region = self
            .lookup_mut(RegionKind::HoldingRegister, address)
            .ok_or(Exception::IllegalDataAddress)?;
        region.set_word(address, value)
    }

    /// Write one coil.
    pub fn write_bit(&mut self, address: Address, value: Coil) -> HookResult<()> {
        let region = self
            .lookup_mut(RegionKind::Coil, address)
            .ok_or(Exception::IllegalDataAddress)?;
        region.set_bit(address, value)
    }

    /// Read one holding register.
    pub fn read_word(&mut self, address: Address) -> HookResult<Word> {
        let region = self
            .lookup_mut(RegionKind::HoldingRegister, address)
            .ok_or(Exception::IllegalDataAddress)?;
        region.get_word(address)
    }

    /// Writes are checked before they are applied so a multi-write is
    /// all-or-nothing with respect to addressing errors.
    pub fn check_word_span(&mut self, start: Address, quantity: Quantity) -> HookResult<()> {
        for offset in 0..quantity {
            let address = start.checked_add(offset).ok_or(Exception::IllegalDataAddress)?;
            let region = self
                .lookup_mut(RegionKind::HoldingRegister, address)
                .ok_or(Exception::IllegalDataAddress)?;
            if region.read_only {
                return Err(Exception::IllegalDataAddress);
            }
        }
        Ok(())
    }

    /// Same as [`RegisterMap::check_word_span`] for coils.
    pub fn check_bit_span(&mut self, start: Address, quantity: Quantity) -> HookResult<()> {
        for offset in 0..quantity {
            let address = start.checked_add(offset).ok_or(Exception::IllegalDataAddress)?;
            let region = self
                .lookup_mut(RegionKind::Coil, address)
                .ok_or(Exception::IllegalDataAddress)?;
            if region.read_only {
                return Err(Exception::IllegalDataAddress);
            }
        }
        Ok(())
    }

    /// Number of registered regions across all kinds.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.tables.iter().map(Vec::len).sum()
    }
}
