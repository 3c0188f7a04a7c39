pub(crate) use crate::error::{Errno::*, Error};
pub(crate) use crate::layers::bio::{BlockId, BlockStore};
pub(crate) use crate::os::{Arc, Box, Mutex, String, ToString, Vec};
pub(crate) use crate::return_errno_with_msg;
pub(crate) use crate::util::{Prf as _, RandomInit, Skcipher as _};

pub(crate) type Result<T> = core::result::Result<T, Error>;

pub(crate) use core::fmt::{self, Debug};
pub(crate) use log::{debug, trace, warn};
