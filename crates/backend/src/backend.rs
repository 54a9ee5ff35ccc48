use crate::error::BackendError;
use crate::object::{ObjectHandle, ObjectKind, ObjectRef};
use crate::param::ParamValue;
use framelink_common::{Channel, PixelFormat, SurfaceExtent};

/// Connection to a rendering backend.
///
/// Objects are mutated with a two-phase protocol: [`set_param`](Backend::set_param)
/// stages a write, [`commit`](Backend::commit) validates and applies every
/// staged write on that object at once. Rendering only ever sees committed
/// values.
pub trait Backend {
    /// Create an object. The caller owns the returned handle.
    fn new_object(&mut self, kind: ObjectKind, subtype: &str)
    -> Result<ObjectHandle, BackendError>;

    /// Stage a parameter write.
    fn set_param(
        &mut self,
        object: ObjectRef,
        name: &str,
        value: ParamValue,
    ) -> Result<(), BackendError>;

    /// Stage removal of a parameter.
    fn unset_param(&mut self, object: ObjectRef, name: &str) -> Result<(), BackendError>;

    /// Validate and apply staged writes.
    ///
    /// Validation failures are reported on the status channel; the call only
    /// fails for misuse (unknown or released object) or after a fatal error.
    fn commit(&mut self, object: ObjectRef) -> Result<(), BackendError>;

    /// Drop the caller's reference. The object lives on while a parent
    /// parameter still refers to it.
    fn release(&mut self, handle: ObjectHandle) -> Result<(), BackendError>;

    /// Stage `child` on `parent` and give up the caller's ownership of it.
    fn set_and_release(
        &mut self,
        parent: ObjectRef,
        name: &str,
        child: ObjectHandle,
    ) -> Result<(), BackendError> {
        self.set_param(parent, name, ParamValue::Object(child.object()))?;
        self.release(child)
    }

    /// Start rendering `frame`. Does not block.
    fn render(&mut self, frame: ObjectRef) -> Result<(), BackendError>;

    /// Block until the render started by [`render`](Backend::render) is complete.
    fn wait(&mut self, frame: ObjectRef) -> Result<(), BackendError>;

    /// Read access to a completed channel, valid until the matching
    /// [`unmap`](Backend::unmap).
    fn map(&mut self, frame: ObjectRef, channel: Channel)
    -> Result<MappedChannel<'_>, BackendError>;

    fn unmap(&mut self, frame: ObjectRef, channel: Channel) -> Result<(), BackendError>;

    /// Last committed value of a parameter.
    fn committed(&self, object: ObjectRef, name: &str) -> Option<ParamValue>;

    /// Number of successful commits on `object`.
    fn commit_count(&self, object: ObjectRef) -> u64;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn new_object(
        &mut self,
        kind: ObjectKind,
        subtype: &str,
    ) -> Result<ObjectHandle, BackendError> {
        (**self).new_object(kind, subtype)
    }

    fn set_param(
        &mut self,
        object: ObjectRef,
        name: &str,
        value: ParamValue,
    ) -> Result<(), BackendError> {
        (**self).set_param(object, name, value)
    }

    fn unset_param(&mut self, object: ObjectRef, name: &str) -> Result<(), BackendError> {
        (**self).unset_param(object, name)
    }

    fn commit(&mut self, object: ObjectRef) -> Result<(), BackendError> {
        (**self).commit(object)
    }

    fn release(&mut self, handle: ObjectHandle) -> Result<(), BackendError> {
        (**self).release(handle)
    }

    fn set_and_release(
        &mut self,
        parent: ObjectRef,
        name: &str,
        child: ObjectHandle,
    ) -> Result<(), BackendError> {
        (**self).set_and_release(parent, name, child)
    }

    fn render(&mut self, frame: ObjectRef) -> Result<(), BackendError> {
        (**self).render(frame)
    }

    fn wait(&mut self, frame: ObjectRef) -> Result<(), BackendError> {
        (**self).wait(frame)
    }

    fn map(
        &mut self,
        frame: ObjectRef,
        channel: Channel,
    ) -> Result<MappedChannel<'_>, BackendError> {
        (**self).map(frame, channel)
    }

    fn unmap(&mut self, frame: ObjectRef, channel: Channel) -> Result<(), BackendError> {
        (**self).unmap(frame, channel)
    }

    fn committed(&self, object: ObjectRef, name: &str) -> Option<ParamValue> {
        (**self).committed(object, name)
    }

    fn commit_count(&self, object: ObjectRef) -> u64 {
        (**self).commit_count(object)
    }
}

/// Pixels of a mapped channel.
#[derive(Debug, Clone, Copy)]
pub enum ChannelPixels<'a> {
    Rgba8(&'a [[u8; 4]]),
    U32(&'a [u32]),
}

/// Borrowed view of one completed channel.
#[derive(Debug, Clone, Copy)]
pub struct MappedChannel<'a> {
    pub channel: Channel,
    pub extent: SurfaceExtent,
    pixels: ChannelPixels<'a>,
}

impl<'a> MappedChannel<'a> {
    pub fn new(channel: Channel, extent: SurfaceExtent, pixels: ChannelPixels<'a>) -> Self {
        Self {
            channel,
            extent,
            pixels,
        }
    }

    pub fn format(&self) -> PixelFormat {
        match self.pixels {
            ChannelPixels::Rgba8(_) => PixelFormat::Rgba8Srgb,
            ChannelPixels::U32(_) => PixelFormat::U32,
        }
    }

    /// Raw bytes, rows bottom to top, tightly packed.
    pub fn bytes(&self) -> &'a [u8] {
        match self.pixels {
            ChannelPixels::Rgba8(px) => bytemuck::cast_slice(px),
            ChannelPixels::U32(px) => bytemuck::cast_slice(px),
        }
    }

    pub fn rgba8(&self) -> Option<&'a [[u8; 4]]> {
        match self.pixels {
            ChannelPixels::Rgba8(px) => Some(px),
            ChannelPixels::U32(_) => None,
        }
    }

    pub fn u32s(&self) -> Option<&'a [u32]> {
        match self.pixels {
            ChannelPixels::U32(px) => Some(px),
            ChannelPixels::Rgba8(_) => None,
        }
    }
}

/// Builder-style staging on top of any [`Backend`].
pub trait BackendExt: Backend {
    /// Stage several parameters on `object` and commit them together.
    ///
    /// ```ignore
    /// backend.edit(camera).set("aspect", 1.5f32).set("fovy", 1.0f32).commit()?;
    /// ```
    fn edit(&mut self, object: ObjectRef) -> ParamEdit<'_, Self> {
        ParamEdit {
            backend: self,
            object,
            result: Ok(()),
        }
    }
}

impl<B: Backend + ?Sized> BackendExt for B {}

/// Pending edit of one object. Nothing is applied until [`ParamEdit::commit`].
///
/// The first failing call short-circuits the rest; its error is returned by
/// `commit`.
#[must_use = "staged parameters are not applied until commit() is called"]
pub struct ParamEdit<'a, B: ?Sized> {
    backend: &'a mut B,
    object: ObjectRef,
    result: Result<(), BackendError>,
}

impl<B: Backend + ?Sized> ParamEdit<'_, B> {
    pub fn set(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        if self.result.is_ok() {
            self.result = self.backend.set_param(self.object, name, value.into());
        }
        self
    }

    pub fn unset(mut self, name: &str) -> Self {
        if self.result.is_ok() {
            self.result = self.backend.unset_param(self.object, name);
        }
        self
    }

    /// Stage `child` and transfer its ownership to the edited object.
    pub fn set_and_release(mut self, name: &str, child: ObjectHandle) -> Self {
        if self.result.is_ok() {
            self.result = self.backend.set_and_release(self.object, name, child);
        }
        self
    }

    pub fn commit(self) -> Result<(), BackendError> {
        self.result?;
        self.backend.commit(self.object)
    }
}
