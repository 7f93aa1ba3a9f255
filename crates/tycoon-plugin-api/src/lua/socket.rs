//! `park.network` and the socket userdata.

use std::sync::Arc;

use mlua::{Function, Lua, Result as LuaResult, Table, UserData, UserDataFields, UserDataMethods};

use crate::engine::EngineShared;
use crate::handle::Handle;
use crate::sockets::SocketEventKind;
use crate::types::LuaFunctionRef;

/// Script-side view of one socket: a handle plus the registry it lives in.
struct LuaSocket {
    handle: Handle,
    shared: Arc<EngineShared>,
}

impl UserData for LuaSocket {
    fn add_fields<F: UserDataFields<Self>>(fields: &mut F) {
        fields.add_field_method_get("handle", |_, this| Ok(this.handle.raw()));
        fields.add_field_method_get("connected", |_, this| {
            Ok(this.shared.sockets.is_connected(this.handle))
        });
    }

    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("connect", |_, this, (host, port): (String, u16)| {
            this.shared.sockets.connect(this.handle, &host, port)?;
            Ok(())
        });

        methods.add_method("write", |_, this, data: mlua::String| {
            this.shared.sockets.write(this.handle, &data.as_bytes())?;
            Ok(())
        });

        methods.add_method("on", |lua, this, (event, callback): (String, Function)| {
            let kind = SocketEventKind::parse(&event)?;
            let callback = LuaFunctionRef::store(lua, callback, &format!("socket:{}", event))?;
            if let Some(previous) = this.shared.sockets.on(this.handle, kind, callback)? {
                previous.cleanup(lua)?;
            }
            Ok(())
        });

        methods.add_method("destroy", |lua, this, ()| {
            if let Some(socket) = this.shared.sockets.destroy(this.handle) {
                for callback in socket.into_handlers() {
                    callback.cleanup(lua)?;
                }
            }
            Ok(())
        });
    }
}

pub(super) fn network_table(lua: &Lua, shared: &Arc<EngineShared>) -> LuaResult<Table> {
    let network = lua.create_table()?;
    let shared = Arc::clone(shared);
    let create_fn = lua.create_function(move |_, ()| {
        let plugin = shared.current_plugin()?;
        let handle = shared.sockets.create(plugin)?;
        Ok(LuaSocket {
            handle,
            shared: Arc::clone(&shared),
        })
    })?;
    network.set("create_socket", create_fn)?;
    Ok(network)
}
