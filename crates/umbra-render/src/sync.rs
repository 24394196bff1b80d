// SPDX-License-Identifier: CEPL-1.0
use crate::context::DeviceContext;
use crate::error::Result;
use crate::gpu::{FenceHandle, SemaphoreHandle};

pub struct Semaphore {
    ctx: DeviceContext,
    semaphore: SemaphoreHandle,
}

impl Semaphore {
    pub fn new(ctx: &DeviceContext) -> Result<Self> {
        Ok(Self {
            ctx: ctx.clone(),
            semaphore: ctx.gpu().create_semaphore()?,
        })
    }

    pub fn handle(&self) -> SemaphoreHandle {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.ctx.gpu().destroy_semaphore(self.semaphore);
    }
}

/// Created unsignaled.
pub struct Fence {
    ctx: DeviceContext,
    fence: FenceHandle,
}

impl Fence {
    pub fn new(ctx: &DeviceContext) -> Result<Self> {
        Ok(Self {
            ctx: ctx.clone(),
            fence: ctx.gpu().create_fence()?,
        })
    }

    pub fn handle(&self) -> FenceHandle {
        self.fence
    }

    pub fn wait(&self) -> Result<()> {
        self.ctx.gpu().wait_fence(self.fence)
    }

    pub fn reset(&self) -> Result<()> {
        self.ctx.gpu().reset_fence(self.fence)
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.ctx.gpu().destroy_fence(self.fence);
    }
}
