pub mod game_routes;
pub mod game_websocket;
