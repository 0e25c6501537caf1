// Authoritative server for Warlock, a turn-based hidden-role party game.
//
// Clients connect over WebSocket, exchange JSON messages, and the server
// owns all game state. Each room is a self-contained actor: one thread,
// one channel, every mutation serialized. Inside a room live the four core
// subsystems:
//
//   EventBus          typed pub/sub with middleware, priority, history
//   CommandProcessor  validated per-player command queues, bulk execution
//   PhaseController   the lobby -> action -> results automaton
//   SocketRouter      event -> transport fan-out (per-player vs broadcast)
//
// Rounds resolve deterministically: commands sort by priority then
// submission time, re-validate right before execution, and emit a single
// ordered results stream. Game content (races, classes, abilities, status
// effects) is read-only behind the ContentCatalog trait.

pub mod api;
pub mod content;
pub mod game;
pub mod server;

pub use api::schema::json::Json;
pub use content::{ContentCatalog, StaticCatalog};
pub use game::GameConfig;
pub use server::WarlockServer;
pub use server::protocol::ws::WebSocketProtocol;
